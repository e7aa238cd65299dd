use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use x11rb::protocol::xproto::{ClientMessageEvent, Timestamp, Window};
use xgrip_core::config::{Options, IGNORED_MODIFIER_COMBINATIONS};
use xgrip_core::keyboard::Keymap;

use crate::bind::registry::BindingRegistry;
use crate::callback::{same, Callback, EventFun};
use crate::error::Result;
use crate::mousebind::drag::DragState;
use crate::x11::call_wrapper::CallWrapper;
use crate::x11::event::{Event, EventKind, Incoming, ProtocolError, NO_WINDOW};
use crate::x11::Transport;

pub type ErrorHandler = dyn Fn(&XUtil, &ProtocolError) + Send + Sync;

type Registry = HashMap<(EventKind, Window), Vec<Arc<dyn Callback>>>;

/// Connection scoped context, owns the event queue and every callback registry.
///
/// All methods take `&self`, callbacks receive the context and may register or remove
/// callbacks, grab and ungrab, or quit the loop while it runs.
pub struct XUtil {
    transport: Box<dyn Transport>,
    root: Window,
    pub(crate) queue: Mutex<VecDeque<Incoming>>,
    callbacks: RwLock<Registry>,
    error_handler: RwLock<Arc<ErrorHandler>>,
    pub(crate) quit: AtomicBool,
    pub(crate) running: AtomicBool,
    pub(crate) last_time: AtomicU32,
    pub(crate) redirect: AtomicU32,
    pub(crate) keymap: RwLock<Keymap>,
    pub(crate) keybinds: Mutex<BindingRegistry>,
    pub(crate) mousebinds: Mutex<BindingRegistry>,
    pub(crate) drag: Mutex<DragState>,
    pub(crate) ignore_mask: u16,
    pub(crate) ignore_combinations: heapless::Vec<u16, IGNORED_MODIFIER_COMBINATIONS>,
    pub(crate) coalesce_motion: bool,
    pub(crate) grab_keyboard_attempts: u32,
}

impl XUtil {
    /// Connects to the display named in `options`.
    pub fn open(options: &Options) -> Result<Self> {
        let transport = CallWrapper::connect(options.display.as_deref())?;
        Self::new(Box::new(transport), options)
    }

    /// Builds a context over an established transport, fetching the current keyboard and
    /// modifier mappings.
    pub fn new(transport: Box<dyn Transport>, options: &Options) -> Result<Self> {
        let ignore_combinations = options.ignore_modifiers.combinations()?;
        let keymap = Keymap::new(transport.keyboard_mapping()?, transport.modifier_mapping()?);
        let root = transport.root();
        tracing::debug!(
            "Context created on root {root}, ignoring modifiers {:#x}",
            options.ignore_modifiers.mask()
        );
        Ok(Self {
            transport,
            root,
            queue: Mutex::new(VecDeque::new()),
            callbacks: RwLock::new(HashMap::new()),
            error_handler: RwLock::new(Arc::new(log_error)),
            quit: AtomicBool::new(false),
            running: AtomicBool::new(false),
            last_time: AtomicU32::new(x11rb::CURRENT_TIME),
            redirect: AtomicU32::new(NO_WINDOW),
            keymap: RwLock::new(keymap),
            keybinds: Mutex::new(BindingRegistry::new(
                EventKind::KeyPress,
                EventKind::KeyRelease,
            )),
            mousebinds: Mutex::new(BindingRegistry::new(
                EventKind::ButtonPress,
                EventKind::ButtonRelease,
            )),
            drag: Mutex::new(DragState::default()),
            ignore_mask: options.ignore_modifiers.mask(),
            ignore_combinations,
            coalesce_motion: options.coalesce_motion,
            grab_keyboard_attempts: options.grab_keyboard_attempts,
        })
    }

    #[must_use]
    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    #[must_use]
    pub fn root(&self) -> Window {
        self.root
    }

    /// Read access to the cached keyboard and modifier mappings.
    pub fn keymap(&self) -> RwLockReadGuard<'_, Keymap> {
        read(&self.keymap)
    }

    /// The last server timestamp seen on an event.
    #[must_use]
    pub fn last_time(&self) -> Timestamp {
        self.last_time.load(Ordering::Relaxed)
    }

    pub fn set_last_time(&self, time: Timestamp) {
        self.last_time.store(time, Ordering::Relaxed);
    }

    /// Registers `callback` for events of its kind on `window`, after any callbacks already
    /// registered there.
    pub fn connect(&self, window: Window, callback: Arc<dyn Callback>) {
        let kind = callback.kind();
        write(&self.callbacks)
            .entry((kind, window))
            .or_default()
            .push(callback);
        tracing::trace!("Connected {kind:?} callback on {window}");
    }

    /// Registers a closure for `kind` events on `window`, the returned handle can be passed
    /// to [`XUtil::disconnect`].
    pub fn on_event<F>(&self, kind: EventKind, window: Window, f: F) -> Arc<dyn Callback>
    where
        F: Fn(&XUtil, &Event) + Send + Sync + 'static,
    {
        let callback: Arc<dyn Callback> = Arc::new(EventFun::new(kind, f));
        self.connect(window, callback.clone());
        callback
    }

    /// Removes one registration of `callback` from `window`, returns whether it was found.
    pub fn disconnect(&self, window: Window, callback: &Arc<dyn Callback>) -> bool {
        let key = (callback.kind(), window);
        let mut callbacks = write(&self.callbacks);
        let Some(list) = callbacks.get_mut(&key) else {
            return false;
        };
        let Some(pos) = list.iter().rposition(|cb| same(cb, callback)) else {
            return false;
        };
        list.remove(pos);
        if list.is_empty() {
            callbacks.remove(&key);
        }
        true
    }

    /// Drops everything registered on `window`, generic callbacks as well as key and button
    /// bindings, releasing their server grabs.
    pub fn detach(&self, window: Window) {
        self.detach_keys(window);
        self.detach_buttons(window);
        write(&self.callbacks).retain(|(_, win), _| *win != window);
        let interrupted = lock(&self.drag).unhook(window);
        if interrupted {
            if let Err(e) = self.ungrab_pointer() {
                tracing::warn!("Failed to release the pointer of an interrupted drag: {e}");
            }
        }
        tracing::debug!("Detached window {window}");
    }

    /// Whether any callback is registered for `kind` on `window`.
    #[must_use]
    pub fn connected(&self, kind: EventKind, window: Window) -> bool {
        read(&self.callbacks).contains_key(&(kind, window))
    }

    /// Runs the callbacks for (`kind`, `window`) in registration order. The list is
    /// snapshotted first, callbacks may change the registry.
    pub fn run_callbacks(&self, kind: EventKind, window: Window, event: &Event) {
        let snapshot = read(&self.callbacks).get(&(kind, window)).cloned();
        if let Some(callbacks) = snapshot {
            for callback in callbacks {
                callback.run(self, event);
            }
        }
    }

    /// Replaces the handler receiving errors the server reports asynchronously.
    pub fn set_error_handler<F>(&self, handler: F)
    where
        F: Fn(&XUtil, &ProtocolError) + Send + Sync + 'static,
    {
        *write(&self.error_handler) = Arc::new(handler);
    }

    pub(crate) fn handle_error(&self, error: &ProtocolError) {
        let handler = read(&self.error_handler).clone();
        handler(self, error);
    }

    /// Sends a client message to `window`, root window messages use the window manager
    /// redirect mask.
    pub fn send_client_message(&self, window: Window, event: ClientMessageEvent) -> Result<()> {
        self.transport.send_client_message(window, event)
    }
}

fn log_error(_xu: &XUtil, error: &ProtocolError) {
    tracing::error!("X error: {error}");
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}
