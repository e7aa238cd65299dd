//! Press, move, release gestures on top of an active pointer grab.
use std::collections::HashSet;
use std::sync::Arc;

use x11rb::protocol::xproto::{Cursor, Window};

use crate::callback::{ButtonReleaseFun, MotionNotifyFun};
use crate::error::Result;
use crate::x11::event::InputEvent;
use crate::xutil::lock;
use crate::XUtil;

pub trait DragHandler: Send + Sync {
    /// Called on the button press. Returning a cursor starts the drag with the pointer
    /// grabbed and shown as that cursor, `None` lets the press pass.
    fn begin(&self, xu: &XUtil, event: &InputEvent) -> Option<Cursor>;

    fn step(&self, xu: &XUtil, event: &InputEvent);

    fn end(&self, xu: &XUtil, event: &InputEvent);
}

#[derive(Default)]
pub(crate) struct DragState {
    /// Grab window and handler of the drag in progress.
    active: Option<(Window, Arc<dyn DragHandler>)>,
    /// Grab windows with motion and release callbacks installed.
    hooked: HashSet<Window>,
}

impl DragState {
    /// Forgets `window` once its callbacks are gone. Returns whether a drag grabbed on it was
    /// still running, the caller owns releasing that pointer grab.
    pub(crate) fn unhook(&mut self, window: Window) -> bool {
        self.hooked.remove(&window);
        if matches!(self.active, Some((grab_window, _)) if grab_window == window) {
            self.active = None;
            true
        } else {
            false
        }
    }
}

impl XUtil {
    /// Starts a drag when `descriptor` is pressed on `window`. While it lasts the pointer is
    /// grabbed on `grab_window`, motion there steps the drag and the release ends it.
    pub fn drag<H>(
        &self,
        grab_window: Window,
        window: Window,
        descriptor: &str,
        handler: H,
    ) -> Result<()>
    where
        H: DragHandler + 'static,
    {
        let handler: Arc<dyn DragHandler> = Arc::new(handler);
        self.bind_button_press(window, descriptor, move |xu, e| {
            begin(xu, grab_window, &handler, e);
        })?;
        let hook = lock(&self.drag).hooked.insert(grab_window);
        if hook {
            self.connect(grab_window, Arc::new(MotionNotifyFun::new(step)));
            self.connect(grab_window, Arc::new(ButtonReleaseFun::new(end)));
        }
        Ok(())
    }

    /// Whether a drag is in progress.
    #[must_use]
    pub fn dragging(&self) -> bool {
        lock(&self.drag).active.is_some()
    }
}

fn begin(xu: &XUtil, grab_window: Window, handler: &Arc<dyn DragHandler>, event: &InputEvent) {
    if xu.dragging() {
        return;
    }
    let Some(cursor) = handler.begin(xu, event) else {
        return;
    };
    match xu.grab_pointer(grab_window, x11rb::NONE, cursor) {
        Ok(()) => {
            lock(&xu.drag).active = Some((grab_window, handler.clone()));
            tracing::debug!("Drag started on {grab_window}");
        }
        Err(e) => tracing::warn!("Could not grab the pointer for a drag on {grab_window}: {e}"),
    }
}

fn step(xu: &XUtil, event: &InputEvent) {
    let active = lock(&xu.drag).active.clone();
    if let Some((_, handler)) = active {
        handler.step(xu, event);
    }
}

fn end(xu: &XUtil, event: &InputEvent) {
    let Some((_, handler)) = lock(&xu.drag).active.take() else {
        return;
    };
    handler.end(xu, event);
    if let Err(e) = xu.ungrab_pointer() {
        tracing::warn!("Failed to release the pointer after a drag: {e}");
    }
    tracing::debug!("Drag ended");
}
