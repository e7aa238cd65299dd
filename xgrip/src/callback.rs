//! Callbacks the dispatch loop invokes, one wrapper type per event kind.
use std::sync::Arc;

use x11rb::protocol::xproto::{
    CirculateNotifyEvent, ClientMessageEvent, ColormapNotifyEvent, ConfigureNotifyEvent,
    ConfigureRequestEvent, CreateNotifyEvent, DestroyNotifyEvent, EnterNotifyEvent, ExposeEvent,
    FocusInEvent, GraphicsExposureEvent, GravityNotifyEvent, KeymapNotifyEvent, MapNotifyEvent,
    MapRequestEvent, MappingNotifyEvent, NoExposureEvent, PropertyNotifyEvent,
    ReparentNotifyEvent, ResizeRequestEvent, SelectionClearEvent, SelectionNotifyEvent,
    SelectionRequestEvent, UnmapNotifyEvent, VisibilityNotifyEvent,
};

use crate::x11::event::{Event, EventKind, InputEvent};
use crate::XUtil;

pub trait Callback: Send + Sync {
    /// The kind of event this callback accepts, events of any other kind are never passed to
    /// [`Callback::run`].
    fn kind(&self) -> EventKind;

    fn run(&self, xu: &XUtil, event: &Event);
}

macro_rules! impl_callbacks {
    ($($name:ident => $variant:ident($payload:ty)),* $(,)?) => {
        $(
            pub struct $name<F>(F);

            impl<F> $name<F>
            where
                F: Fn(&XUtil, &$payload) + Send + Sync,
            {
                pub fn new(f: F) -> Self {
                    Self(f)
                }
            }

            impl<F> Callback for $name<F>
            where
                F: Fn(&XUtil, &$payload) + Send + Sync,
            {
                fn kind(&self) -> EventKind {
                    EventKind::$variant
                }

                fn run(&self, xu: &XUtil, event: &Event) {
                    if let Event::$variant(e) = event {
                        (self.0)(xu, e);
                    }
                }
            }
        )*
    };
}

impl_callbacks!(
    KeyPressFun => KeyPress(InputEvent),
    KeyReleaseFun => KeyRelease(InputEvent),
    ButtonPressFun => ButtonPress(InputEvent),
    ButtonReleaseFun => ButtonRelease(InputEvent),
    MotionNotifyFun => MotionNotify(InputEvent),
    EnterNotifyFun => EnterNotify(EnterNotifyEvent),
    LeaveNotifyFun => LeaveNotify(EnterNotifyEvent),
    FocusInFun => FocusIn(FocusInEvent),
    FocusOutFun => FocusOut(FocusInEvent),
    KeymapNotifyFun => KeymapNotify(KeymapNotifyEvent),
    ExposeFun => Expose(ExposeEvent),
    GraphicsExposureFun => GraphicsExposure(GraphicsExposureEvent),
    NoExposureFun => NoExposure(NoExposureEvent),
    VisibilityNotifyFun => VisibilityNotify(VisibilityNotifyEvent),
    CreateNotifyFun => CreateNotify(CreateNotifyEvent),
    DestroyNotifyFun => DestroyNotify(DestroyNotifyEvent),
    UnmapNotifyFun => UnmapNotify(UnmapNotifyEvent),
    MapNotifyFun => MapNotify(MapNotifyEvent),
    MapRequestFun => MapRequest(MapRequestEvent),
    ReparentNotifyFun => ReparentNotify(ReparentNotifyEvent),
    ConfigureNotifyFun => ConfigureNotify(ConfigureNotifyEvent),
    ConfigureRequestFun => ConfigureRequest(ConfigureRequestEvent),
    GravityNotifyFun => GravityNotify(GravityNotifyEvent),
    ResizeRequestFun => ResizeRequest(ResizeRequestEvent),
    CirculateNotifyFun => CirculateNotify(CirculateNotifyEvent),
    CirculateRequestFun => CirculateRequest(CirculateNotifyEvent),
    PropertyNotifyFun => PropertyNotify(PropertyNotifyEvent),
    SelectionClearFun => SelectionClear(SelectionClearEvent),
    SelectionRequestFun => SelectionRequest(SelectionRequestEvent),
    SelectionNotifyFun => SelectionNotify(SelectionNotifyEvent),
    ColormapNotifyFun => ColormapNotify(ColormapNotifyEvent),
    ClientMessageFun => ClientMessage(ClientMessageEvent),
    MappingNotifyFun => MappingNotify(MappingNotifyEvent),
);

/// A callback over the whole event, for any kind.
pub struct EventFun<F> {
    kind: EventKind,
    f: F,
}

impl<F> EventFun<F>
where
    F: Fn(&XUtil, &Event) + Send + Sync,
{
    pub fn new(kind: EventKind, f: F) -> Self {
        Self { kind, f }
    }
}

impl<F> Callback for EventFun<F>
where
    F: Fn(&XUtil, &Event) + Send + Sync,
{
    fn kind(&self) -> EventKind {
        self.kind
    }

    fn run(&self, xu: &XUtil, event: &Event) {
        if event.kind() == self.kind {
            (self.f)(xu, event);
        }
    }
}

/// Wraps an input handler into the callback type matching `kind`, `None` for kinds that
/// are not input events.
pub(crate) fn input_callback<F>(kind: EventKind, f: F) -> Option<Arc<dyn Callback>>
where
    F: Fn(&XUtil, &InputEvent) + Send + Sync + 'static,
{
    let callback: Arc<dyn Callback> = match kind {
        EventKind::KeyPress => Arc::new(KeyPressFun::new(f)),
        EventKind::KeyRelease => Arc::new(KeyReleaseFun::new(f)),
        EventKind::ButtonPress => Arc::new(ButtonPressFun::new(f)),
        EventKind::ButtonRelease => Arc::new(ButtonReleaseFun::new(f)),
        EventKind::MotionNotify => Arc::new(MotionNotifyFun::new(f)),
        _ => return None,
    };
    Some(callback)
}

/// Identity of a shared callback, ignoring which vtable the pointer carries.
pub(crate) fn same(a: &Arc<dyn Callback>, b: &Arc<dyn Callback>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a).cast::<()>(),
        Arc::as_ptr(b).cast::<()>(),
    )
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use crate::callback::{input_callback, same, Callback, EventFun, KeyPressFun};
    use crate::x11::event::EventKind;
    use crate::x11::testing::{key_press, key_release, xutil, MockTransport};

    #[test]
    fn typed_callbacks_ignore_other_kinds() {
        let xu = xutil(&MockTransport::new());
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let callback = KeyPressFun::new(move |_, e| {
            counter.fetch_add(usize::from(e.detail), Ordering::SeqCst);
        });
        assert_eq!(EventKind::KeyPress, callback.kind());
        callback.run(&xu, &key_press(5, 24, 0));
        callback.run(&xu, &key_release(5, 24, 0));
        assert_eq!(24, seen.load(Ordering::SeqCst));
    }

    #[test]
    fn event_fun_filters_on_kind() {
        let xu = xutil(&MockTransport::new());
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = seen.clone();
        let callback = EventFun::new(EventKind::KeyRelease, move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        callback.run(&xu, &key_press(5, 24, 0));
        callback.run(&xu, &key_release(5, 24, 0));
        assert_eq!(1, seen.load(Ordering::SeqCst));
    }

    #[test]
    fn input_callbacks_only_for_input_kinds() {
        assert!(input_callback(EventKind::MapRequest, |_, _| {}).is_none());
        let a = input_callback(EventKind::ButtonRelease, |_, _| {}).unwrap();
        assert_eq!(EventKind::ButtonRelease, a.kind());
        let b = a.clone();
        let c = input_callback(EventKind::ButtonRelease, |_, _| {}).unwrap();
        assert!(same(&a, &b));
        assert!(!same(&a, &c));
    }
}
