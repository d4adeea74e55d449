//! Developer benchmark lines ("level 6") with a thread-local sink, so tests can assert
//! on them without racing on the global logger.

use std::cell::RefCell;

thread_local! {
    static TL_SINK: RefCell<Option<Vec<String>>> = const { RefCell::new(None) };
}

/// Guard that disables the thread-local sink on drop.
pub struct DevSinkGuard;

impl Drop for DevSinkGuard {
    fn drop(&mut self) {
        TL_SINK.with(|s| *s.borrow_mut() = None);
    }
}

/// Start capturing on the current thread until the guard drops.
#[must_use]
pub fn enable_thread_sink() -> DevSinkGuard {
    TL_SINK.with(|s| *s.borrow_mut() = Some(Vec::new()));
    DevSinkGuard
}

pub fn write_str(msg: &str) {
    TL_SINK.with(|s| {
        if let Some(buf) = s.borrow_mut().as_mut() {
            buf.push(msg.to_owned());
        }
    });
}

/// Take the captured lines, leaving the sink enabled and empty.
pub fn drain() -> Vec<String> {
    TL_SINK.with(|s| s.borrow_mut().as_mut().map(std::mem::take).unwrap_or_default())
}

/// Captured lines parsed as JSON, skipping anything that is not.
pub fn drain_json() -> Vec<serde_json::Value> {
    drain().iter().filter_map(|l| serde_json::from_str(l).ok()).collect()
}

/// Emit a developer log line and capture it in the thread-local sink if enabled.
#[macro_export]
macro_rules! dev6 {
    ($($arg:tt)*) => {{
        let __s = format!($($arg)*);
        $crate::utils::devlog::write_str(&__s);
        log::log!(target: $crate::logger::DEV6_TARGET, log::Level::Trace, "{}", __s);
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_local_sink_captures_messages() {
        let _g = enable_thread_sink();
        crate::dev6!("alpha {}", 1);
        crate::dev6!("{{\"bench\":\"beta\"}}");
        let lines = drain();
        assert_eq!(lines[0], "alpha 1");
        assert!(drain().is_empty());
        crate::dev6!("{{\"bench\":\"gamma\"}}");
        assert_eq!(drain_json()[0]["bench"], "gamma");
    }

    #[test]
    fn other_threads_are_not_captured() {
        let _g = enable_thread_sink();
        crate::dev6!("main-thread");
        let child = std::thread::spawn(|| {
            crate::dev6!("child-thread");
            drain()
        })
        .join()
        .unwrap();
        assert!(child.is_empty());
        assert_eq!(drain(), vec!["main-thread".to_string()]);
    }
}
