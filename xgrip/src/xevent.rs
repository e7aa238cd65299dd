//! The event queue and the loop dispatching it.
use std::sync::atomic::Ordering;

use x11rb::protocol::xproto::{Mapping, MappingNotifyEvent};

use crate::error::{Error, Result};
use crate::x11::event::{Event, Incoming, InputEvent};
use crate::xutil::{lock, write};
use crate::XUtil;

/// Marks the loop as running for as long as it lives.
struct RunGuard<'a> {
    xu: &'a XUtil,
}

impl<'a> RunGuard<'a> {
    fn acquire(xu: &'a XUtil) -> Result<Self> {
        if xu.running.swap(true, Ordering::SeqCst) {
            return Err(Error::LoopRunning);
        }
        Ok(Self { xu })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.xu.quit.store(false, Ordering::SeqCst);
        self.xu.running.store(false, Ordering::SeqCst);
    }
}

impl XUtil {
    /// Moves events from the connection to the queue. When `block` is set, waits for at least
    /// one, after which everything already buffered is drained without blocking.
    pub fn read(&self, block: bool) -> Result<()> {
        let mut incoming = Vec::new();
        if block {
            incoming.push(self.transport().wait_for_event()?);
        }
        while let Some(entry) = self.transport().poll_for_event()? {
            incoming.push(entry);
        }
        if !incoming.is_empty() {
            lock(&self.queue).extend(incoming);
        }
        Ok(())
    }

    /// Dispatches events until [`XUtil::quit`] is called or the connection fails.
    ///
    /// Errors the server reports go to the error handler, a failing connection ends the loop
    /// with an error.
    pub fn run(&self) -> Result<()> {
        let _guard = RunGuard::acquire(self)?;
        tracing::debug!("Event loop started");
        while !self.quitting() {
            self.read(true)?;
            while !self.quitting() {
                let Some(entry) = lock(&self.queue).pop_front() else {
                    break;
                };
                match entry {
                    Incoming::Error(e) => self.handle_error(&e),
                    Incoming::Event(event) => self.dispatch(event)?,
                }
            }
        }
        tracing::debug!("Event loop quit");
        Ok(())
    }

    /// Stops the loop once the event being dispatched is done.
    pub fn quit(&self) {
        self.quit.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn quitting(&self) -> bool {
        self.quit.load(Ordering::SeqCst)
    }

    /// A snapshot of the events read but not yet dispatched.
    #[must_use]
    pub fn peek(&self) -> Vec<Incoming> {
        lock(&self.queue).iter().cloned().collect()
    }

    /// Removes the queued entry at `index`, it is never dispatched.
    pub fn dequeue_at(&self, index: usize) -> Option<Incoming> {
        lock(&self.queue).remove(index)
    }

    fn dispatch(&self, mut event: Event) -> Result<()> {
        match &mut event {
            Event::KeyPress(e) | Event::KeyRelease(e) => {
                if let Some(window) = self.redirected() {
                    e.event = window;
                }
            }
            Event::MotionNotify(e) if self.coalesce_motion => {
                *e = self.compress_motion(*e)?;
            }
            Event::MappingNotify(e) => self.refresh_mapping(e)?,
            Event::Unsupported(name) => {
                tracing::debug!("Skipping unsupported event {name}");
                return Ok(());
            }
            _ => {}
        }
        if let Some(time) = event.time() {
            self.set_last_time(time);
        }
        let kind = event.kind();
        for window in event.targets() {
            tracing::trace!("Dispatching {kind:?} to {window}");
            self.run_callbacks(kind, window, &event);
        }
        Ok(())
    }

    /// Folds later motion on the same window into `event`, stopping at the first other event
    /// for that window.
    fn compress_motion(&self, mut event: InputEvent) -> Result<InputEvent> {
        let mut folded = 0usize;
        loop {
            self.transport().flush()?;
            self.read(false)?;
            let next = {
                let mut queue = lock(&self.queue);
                let found = queue.iter().position(|entry| match entry {
                    Incoming::Event(Event::MotionNotify(next)) => next.event == event.event,
                    Incoming::Event(other) => other.targets().contains(&event.event),
                    Incoming::Error(_) => false,
                });
                match found.map(|ind| (ind, &queue[ind])) {
                    Some((ind, Incoming::Event(Event::MotionNotify(next)))) => {
                        let next = *next;
                        queue.remove(ind);
                        Some(next)
                    }
                    _ => None,
                }
            };
            let Some(next) = next else {
                if folded > 0 {
                    tracing::trace!("Folded {folded} motion events on {}", event.event);
                }
                return Ok(event);
            };
            event.time = next.time;
            event.root_x = next.root_x;
            event.root_y = next.root_y;
            event.event_x = next.event_x;
            event.event_y = next.event_y;
            event.state = next.state;
            folded += 1;
        }
    }

    fn refresh_mapping(&self, event: &MappingNotifyEvent) -> Result<()> {
        if event.request == Mapping::KEYBOARD {
            let keyboard = self.transport().keyboard_mapping()?;
            self.remap_keys(keyboard);
        } else if event.request == Mapping::MODIFIER {
            let modifiers = self.transport().modifier_mapping()?;
            write(&self.keymap).set_modifiers(modifiers);
            tracing::debug!("Modifier mapping refreshed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use x11rb::protocol::xproto::Mapping;
    use x11rb::protocol::ErrorKind;
    use xgrip_core::config::Options;
    use xgrip_core::keyboard::ModifierMapping;

    use crate::callback::{ButtonPressFun, MapRequestFun, MotionNotifyFun};
    use crate::error::Error;
    use crate::x11::event::{Event, EventKind, Incoming};
    use crate::x11::testing::{
        bad_window, button_press, configure_request, keyboard, map_request, mapping_notify,
        motion, property_notify, xutil, MockTransport, ROOT,
    };
    use crate::XUtil;

    fn positions(xu: &XUtil, window: u32) -> Arc<Mutex<Vec<(i16, i16, u32)>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let inner = seen.clone();
        xu.connect(
            window,
            Arc::new(MotionNotifyFun::new(move |_, e| {
                inner.lock().unwrap().push((e.root_x, e.root_y, e.time));
            })),
        );
        seen
    }

    #[test]
    fn ends_on_closed_connection() {
        let xu = xutil(&MockTransport::new());
        assert!(matches!(xu.run(), Err(Error::ConnectionClosed)));
        assert!(!xu.running.load(Ordering::SeqCst));
    }

    #[test]
    fn quit_stops_after_current_event() {
        let mock = MockTransport::new();
        let xu = xutil(&mock);
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        xu.on_event(EventKind::PropertyNotify, 3, move |xu, _| {
            counter.fetch_add(1, Ordering::SeqCst);
            xu.quit();
        });
        mock.push(property_notify(3, 10));
        mock.push(property_notify(3, 11));
        xu.run().unwrap();
        assert_eq!(1, count.load(Ordering::SeqCst));
        assert_eq!(10, xu.last_time());
        assert!(!xu.quitting());
        assert_eq!(1, xu.peek().len());
    }

    #[test]
    fn refuses_nested_runs() {
        let mock = MockTransport::new();
        let xu = xutil(&mock);
        let nested = Arc::new(Mutex::new(None));
        let inner = nested.clone();
        xu.on_event(EventKind::PropertyNotify, 3, move |xu, _| {
            *inner.lock().unwrap() = Some(matches!(xu.run(), Err(Error::LoopRunning)));
            xu.quit();
        });
        mock.push(property_notify(3, 10));
        xu.run().unwrap();
        assert_eq!(Some(true), *nested.lock().unwrap());
    }

    #[test]
    fn errors_reach_the_handler() {
        let mock = MockTransport::new();
        let xu = xutil(&mock);
        let errors = Arc::new(Mutex::new(Vec::new()));
        let inner = errors.clone();
        xu.set_error_handler(move |_, e| inner.lock().unwrap().push(e.clone()));
        mock.push_error(bad_window(42));
        mock.push(property_notify(3, 10));
        assert!(xu.run().is_err());
        let errors = errors.lock().unwrap();
        assert_eq!(1, errors.len());
        assert_eq!(ErrorKind::Window, errors[0].kind);
        assert_eq!(42, errors[0].bad_value);
        assert_eq!(10, xu.last_time());
    }

    #[test]
    fn unsupported_events_are_skipped() {
        let mock = MockTransport::new();
        let xu = xutil(&mock);
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        xu.on_event(EventKind::PropertyNotify, 3, move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        mock.push(Event::Unsupported("ShapeNotify".to_string()));
        mock.push(property_notify(3, 12));
        assert!(matches!(xu.run(), Err(Error::ConnectionClosed)));
        assert_eq!(1, count.load(Ordering::SeqCst));
        assert_eq!(12, xu.last_time());
        assert!(xu.peek().is_empty());
    }

    #[test]
    fn requests_reach_window_and_parent() {
        let mock = MockTransport::new();
        let xu = xutil(&mock);
        let seen = Arc::new(Mutex::new(Vec::new()));
        for window in [ROOT, 9] {
            let map_seen = seen.clone();
            xu.connect(
                window,
                Arc::new(MapRequestFun::new(move |_, e| {
                    map_seen.lock().unwrap().push((window, e.window));
                })),
            );
            let configure_seen = seen.clone();
            xu.on_event(EventKind::ConfigureRequest, window, move |_, _| {
                configure_seen.lock().unwrap().push((window, 0));
            });
        }
        mock.push(map_request(ROOT, 9));
        mock.push(configure_request(ROOT, 9));
        assert!(xu.run().is_err());
        assert_eq!(
            vec![(9, 9), (ROOT, 9), (9, 0), (ROOT, 0)],
            *seen.lock().unwrap()
        );
    }

    #[test]
    fn motion_folds_into_last_position() {
        let mock = MockTransport::new();
        let xu = xutil(&mock);
        let seen = positions(&xu, 5);
        for i in 0..4 {
            mock.push(motion(5, i, i * 2, 100 + i as u32));
        }
        assert!(xu.run().is_err());
        assert_eq!(vec![(3, 6, 103)], *seen.lock().unwrap());
        assert_eq!(103, xu.last_time());
    }

    #[test]
    fn single_motion_is_unchanged() {
        let mock = MockTransport::new();
        let xu = xutil(&mock);
        let seen = positions(&xu, 5);
        mock.push(motion(5, 7, 8, 100));
        mock.push(motion(6, 1, 1, 101));
        assert!(xu.run().is_err());
        assert_eq!(vec![(7, 8, 100)], *seen.lock().unwrap());
    }

    #[test]
    fn motion_stops_at_other_events_for_the_window() {
        let mock = MockTransport::new();
        let xu = xutil(&mock);
        let seen = positions(&xu, 5);
        let presses = Arc::new(AtomicUsize::new(0));
        let inner = presses.clone();
        xu.connect(
            5,
            Arc::new(ButtonPressFun::new(move |_, _| {
                inner.fetch_add(1, Ordering::SeqCst);
            })),
        );
        mock.push(motion(5, 1, 1, 1));
        mock.push(motion(5, 2, 2, 2));
        mock.push(button_press(5, 1, 0));
        mock.push(motion(5, 3, 3, 3));
        mock.push(motion(5, 4, 4, 4));
        assert!(xu.run().is_err());
        assert_eq!(vec![(2, 2, 2), (4, 4, 4)], *seen.lock().unwrap());
        assert_eq!(1, presses.load(Ordering::SeqCst));
    }

    #[test]
    fn coalescing_can_be_disabled() {
        let mock = MockTransport::new();
        let options = Options {
            coalesce_motion: false,
            ..Options::default()
        };
        let xu = XUtil::new(Box::new(mock.clone()), &options).unwrap();
        let seen = positions(&xu, 5);
        mock.push(motion(5, 1, 1, 1));
        mock.push(motion(5, 2, 2, 2));
        assert!(xu.run().is_err());
        assert_eq!(2, seen.lock().unwrap().len());
    }

    #[test]
    fn modifier_mapping_refreshes_group_masks() {
        let mock = MockTransport::new();
        let xu = xutil(&mock);
        assert_eq!(0, xu.keymap().mode_switch_mask());
        mock.state().keyboard = keyboard(&[(203, &[0xff7e])]);
        mock.push(mapping_notify(Mapping::KEYBOARD, 8, 248));
        assert!(xu.run().is_err());
        assert_eq!(0, xu.keymap().mode_switch_mask());
        // Mode_switch on mod3
        mock.state().modifiers =
            ModifierMapping::new(vec![50, 0, 66, 0, 37, 0, 64, 0, 77, 0, 203, 0, 133, 0, 0, 0]);
        mock.push(mapping_notify(Mapping::MODIFIER, 0, 0));
        assert!(xu.run().is_err());
        assert_eq!(0x20, xu.keymap().mode_switch_mask());
    }

    #[test]
    fn mapping_query_failure_is_fatal() {
        let mock = MockTransport::new();
        let xu = xutil(&mock);
        mock.state().fail_mapping_queries = true;
        mock.push(mapping_notify(Mapping::KEYBOARD, 8, 248));
        mock.push(property_notify(3, 1));
        assert!(matches!(xu.run(), Err(Error::ConnectionClosed)));
        assert_eq!(1, xu.peek().len());
    }

    #[test]
    fn peek_and_dequeue() {
        let mock = MockTransport::new();
        let xu = xutil(&mock);
        mock.push(property_notify(3, 1));
        mock.push(property_notify(4, 2));
        xu.read(false).unwrap();
        assert_eq!(2, xu.peek().len());
        assert!(matches!(
            xu.dequeue_at(0),
            Some(Incoming::Event(Event::PropertyNotify(_)))
        ));
        assert!(xu.dequeue_at(1).is_none());
        assert_eq!(1, xu.peek().len());
    }
}
