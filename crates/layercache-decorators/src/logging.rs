//! Operation-logging decorator

use std::collections::HashMap;
use std::fmt::{self, Debug};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use layercache::{AsyncHandle, Cache, CasOperation, Result, SharedCache, Ttl};
use tracing::Level;

/// Target every event from this decorator is emitted under
pub const TARGET: &str = "layercache::logging";

macro_rules! emit {
    ($level:expr, $($fields:tt)+) => {{
        let level = $level;
        if level == Level::ERROR {
            tracing::event!(target: TARGET, Level::ERROR, $($fields)+)
        } else if level == Level::WARN {
            tracing::event!(target: TARGET, Level::WARN, $($fields)+)
        } else if level == Level::INFO {
            tracing::event!(target: TARGET, Level::INFO, $($fields)+)
        } else if level == Level::DEBUG {
            tracing::event!(target: TARGET, Level::DEBUG, $($fields)+)
        } else {
            tracing::event!(target: TARGET, Level::TRACE, $($fields)+)
        }
    }};
}

macro_rules! enabled {
    ($level:expr) => {{
        let level = $level;
        if level == Level::ERROR {
            tracing::enabled!(target: TARGET, Level::ERROR)
        } else if level == Level::WARN {
            tracing::enabled!(target: TARGET, Level::WARN)
        } else if level == Level::INFO {
            tracing::enabled!(target: TARGET, Level::INFO)
        } else if level == Level::DEBUG {
            tracing::enabled!(target: TARGET, Level::DEBUG)
        } else {
            tracing::enabled!(target: TARGET, Level::TRACE)
        }
    }};
}

const UNPRINTABLE: &str = "<unprintable>";

/// Renders a key list without allocating ahead of the subscriber
struct Keys<'a, K>(&'a [K]);

impl<K: AsRef<str>> Debug for Keys<'_, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.0.iter().map(|key| key.as_ref()))
            .finish()
    }
}

/// Emits one `tracing` event per operation and forwards it unchanged
///
/// Synchronous operations log their outcome. Async operations log the
/// submission only; the delegate's async variant does the work. Emission
/// never affects the result: a panicking subscriber is contained.
pub struct LoggingCache<V> {
    delegate: SharedCache<V>,
    level: Level,
}

impl<V> LoggingCache<V>
where
    V: Debug + Send + 'static,
{
    /// Wrap `delegate`, logging at `DEBUG`
    pub fn new(delegate: SharedCache<V>) -> Self {
        Self::with_level(delegate, Level::DEBUG)
    }

    /// Wrap `delegate`, logging at `level`
    pub fn with_level(delegate: SharedCache<V>, level: Level) -> Self {
        Self { delegate, level }
    }

    /// Configured level
    pub fn level(&self) -> Level {
        self.level
    }

    fn record(&self, op: &'static str, key: &dyn Debug, outcome: &dyn Debug) {
        let level = self.level;
        let id = self.delegate.id();
        let _ = panic::catch_unwind(AssertUnwindSafe(|| {
            emit!(level, cache = %id, op, key = ?key, outcome = ?outcome);
        }));
    }

    fn submitted(&self, op: &'static str, key: &dyn Debug) {
        let level = self.level;
        let id = self.delegate.id();
        let _ = panic::catch_unwind(AssertUnwindSafe(|| {
            emit!(level, cache = %id, op, key = ?key, "submitted");
        }));
    }

    /// `Debug` rendering of a value about to be moved into the delegate
    fn render(&self, value: &V) -> Option<String> {
        if !enabled!(self.level) {
            return None;
        }
        let rendered = panic::catch_unwind(AssertUnwindSafe(|| format!("{value:?}")));
        Some(rendered.unwrap_or_else(|_| UNPRINTABLE.to_string()))
    }

    fn logged<T: Debug>(&self, op: &'static str, key: &dyn Debug, result: Result<T>) -> Result<T> {
        self.record(op, key, &result);
        result
    }
}

impl<V> Cache<V> for LoggingCache<V>
where
    V: Debug + Send + 'static,
{
    fn id(&self) -> &str {
        self.delegate.id()
    }

    fn start(&self) -> Result<()> {
        let result = self.delegate.start();
        self.logged("start", &(), result)
    }

    fn stop(&self) -> Result<()> {
        let result = self.delegate.stop();
        self.logged("stop", &(), result)
    }

    fn is_started(&self) -> bool {
        self.delegate.is_started()
    }

    fn executor(&self) -> Result<layercache::Executor> {
        self.delegate.executor()
    }

    fn contains_key(&self, key: &str) -> Result<bool> {
        let result = self.delegate.contains_key(key);
        self.logged("contains_key", &key, result)
    }

    fn put_with(
        &self,
        key: &str,
        value: V,
        ttl: Ttl,
        cas: Option<&dyn CasOperation<V>>,
    ) -> Result<()> {
        let op = if cas.is_some() { "put_cas" } else { "put" };
        let rendered = self.render(&value);
        let result = self.delegate.put_with(key, value, ttl, cas);
        self.record(op, &key, &(&rendered, &ttl, &result));
        result
    }

    fn get(&self, key: &str) -> Result<Option<V>> {
        let result = self.delegate.get(key);
        self.logged("get", &key, result)
    }

    fn get_many(&self, keys: &[&str]) -> Result<HashMap<String, V>> {
        let result = self.delegate.get_many(keys);
        self.logged("get_many", &Keys(keys), result)
    }

    fn remove(&self, key: &str) -> Result<Option<V>> {
        let result = self.delegate.remove(key);
        self.logged("remove", &key, result)
    }

    fn remove_many(&self, keys: &[&str]) -> Result<Vec<Option<V>>> {
        let result = self.delegate.remove_many(keys);
        self.logged("remove_many", &Keys(keys), result)
    }

    fn clear(&self) -> Result<bool> {
        let result = self.delegate.clear();
        self.logged("clear", &(), result)
    }

    fn get_counter(&self, key: &str) -> Result<i64> {
        let result = self.delegate.get_counter(key);
        self.logged("get_counter", &key, result)
    }

    fn set_counter(&self, key: &str, value: i64) -> Result<()> {
        let result = self.delegate.set_counter(key, value);
        self.record("set_counter", &key, &(value, &result));
        result
    }

    fn increment(&self, key: &str, delta: i64) -> Result<i64> {
        let result = self.delegate.increment(key, delta);
        self.logged("increment", &key, result)
    }

    fn decrement(&self, key: &str, delta: i64) -> Result<i64> {
        let result = self.delegate.decrement(key, delta);
        self.logged("decrement", &key, result)
    }

    fn contains_key_async(self: Arc<Self>, key: String) -> AsyncHandle<bool> {
        self.submitted("contains_key_async", &key);
        Arc::clone(&self.delegate).contains_key_async(key)
    }

    fn put_async(self: Arc<Self>, key: String, value: V) -> AsyncHandle<()> {
        self.submitted("put_async", &key);
        Arc::clone(&self.delegate).put_async(key, value)
    }

    fn put_ttl_async(self: Arc<Self>, key: String, value: V, ttl: Ttl) -> AsyncHandle<()> {
        self.submitted("put_ttl_async", &key);
        Arc::clone(&self.delegate).put_ttl_async(key, value, ttl)
    }

    fn put_with_async(
        self: Arc<Self>,
        key: String,
        value: V,
        ttl: Ttl,
        cas: Option<Arc<dyn CasOperation<V>>>,
    ) -> AsyncHandle<()> {
        self.submitted("put_with_async", &key);
        Arc::clone(&self.delegate).put_with_async(key, value, ttl, cas)
    }

    fn get_async(self: Arc<Self>, key: String) -> AsyncHandle<Option<V>> {
        self.submitted("get_async", &key);
        Arc::clone(&self.delegate).get_async(key)
    }

    fn get_many_async(self: Arc<Self>, keys: Vec<String>) -> AsyncHandle<HashMap<String, V>> {
        self.submitted("get_many_async", &Keys(&keys));
        Arc::clone(&self.delegate).get_many_async(keys)
    }

    fn remove_async(self: Arc<Self>, key: String) -> AsyncHandle<Option<V>> {
        self.submitted("remove_async", &key);
        Arc::clone(&self.delegate).remove_async(key)
    }

    fn remove_many_async(self: Arc<Self>, keys: Vec<String>) -> AsyncHandle<Vec<Option<V>>> {
        self.submitted("remove_many_async", &Keys(&keys));
        Arc::clone(&self.delegate).remove_many_async(keys)
    }

    fn clear_async(self: Arc<Self>) -> AsyncHandle<bool> {
        self.submitted("clear_async", &());
        Arc::clone(&self.delegate).clear_async()
    }

    fn get_counter_async(self: Arc<Self>, key: String) -> AsyncHandle<i64> {
        self.submitted("get_counter_async", &key);
        Arc::clone(&self.delegate).get_counter_async(key)
    }

    fn increment_async(self: Arc<Self>, key: String, delta: i64) -> AsyncHandle<i64> {
        self.submitted("increment_async", &key);
        Arc::clone(&self.delegate).increment_async(key, delta)
    }

    fn decrement_async(self: Arc<Self>, key: String, delta: i64) -> AsyncHandle<i64> {
        self.submitted("decrement_async", &key);
        Arc::clone(&self.delegate).decrement_async(key, delta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    use parking_lot::Mutex;

    use layercache::{CacheConfig, Error, MemoryCache};
    use tracing_subscriber::fmt::MakeWriter;

    /// Collects formatted log output in memory
    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Capture {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().clone()).unwrap()
        }
    }

    impl io::Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl<'a> MakeWriter<'a> for Capture {
        type Writer = Capture;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    fn captured<T>(run: impl FnOnce() -> T) -> (T, String) {
        let capture = Capture::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(capture.clone())
            .with_max_level(Level::TRACE)
            .with_ansi(false)
            .with_target(true)
            .finish();
        let out = tracing::subscriber::with_default(subscriber, run);
        (out, capture.contents())
    }

    fn stack(level: Level) -> (Arc<MemoryCache<i32>>, Arc<LoggingCache<i32>>) {
        let memory = MemoryCache::started(CacheConfig::with_id("logging-test")).unwrap();
        let logging = LoggingCache::with_level(memory.clone() as SharedCache<i32>, level);
        (memory, Arc::new(logging))
    }

    #[test]
    fn test_results_pass_through() {
        let (memory, logging) = stack(Level::INFO);
        logging.put("a", 1).unwrap();

        assert_eq!(memory.get("a").unwrap(), Some(1));
        assert_eq!(logging.get("a").unwrap(), Some(1));
        assert!(matches!(logging.get(""), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn test_events_carry_operation_and_key() {
        let (_memory, logging) = stack(Level::INFO);
        let (_, output) = captured(|| {
            logging.put("alpha", 7).unwrap();
            logging.get("alpha").unwrap();
        });

        assert!(output.contains(TARGET));
        assert!(output.contains("INFO"));
        assert!(output.contains("op=\"put\""));
        assert!(output.contains("op=\"get\""));
        assert!(output.contains("\"alpha\""));
        assert!(output.contains("Ok(Some(7))"));
    }

    #[test]
    fn test_level_is_respected() {
        let (_memory, logging) = stack(Level::WARN);
        let (_, output) = captured(|| logging.clear().unwrap());

        assert!(output.contains("WARN"));
        assert!(output.contains("op=\"clear\""));
    }

    #[test]
    fn test_async_logs_submission() {
        let (memory, logging) = stack(Level::DEBUG);
        let (handle, output) = captured(|| {
            Arc::clone(&logging).put_async("b".to_string(), 2)
        });
        handle.wait().unwrap();

        assert_eq!(memory.get("b").unwrap(), Some(2));
        assert!(output.contains("op=\"put_async\""));
        assert!(output.contains("submitted"));
    }

    /// Value whose `Debug` impl panics
    #[derive(Clone, PartialEq)]
    struct Unprintable(i32);

    impl Debug for Unprintable {
        fn fmt(&self, _: &mut fmt::Formatter<'_>) -> fmt::Result {
            panic!("Debug for Unprintable")
        }
    }

    #[test]
    fn test_panicking_debug_does_not_reach_caller() {
        let memory =
            MemoryCache::<Unprintable>::started(CacheConfig::with_id("logging-panic")).unwrap();
        let logging = LoggingCache::new(memory.clone() as SharedCache<Unprintable>);
        let (result, output) = captured(|| logging.put("k", Unprintable(1)));

        assert!(result.is_ok());
        assert!(memory.get("k").unwrap() == Some(Unprintable(1)));
        assert!(output.contains(UNPRINTABLE));
    }

    #[test]
    fn test_disabled_level_skips_rendering() {
        let memory =
            MemoryCache::<Unprintable>::started(CacheConfig::with_id("logging-quiet")).unwrap();
        let logging = LoggingCache::new(memory.clone() as SharedCache<Unprintable>);

        assert!(logging.render(&Unprintable(2)).is_none());
        logging.put("k", Unprintable(2)).unwrap();
        assert!(memory.contains_key("k").unwrap());
    }

    #[test]
    fn test_errors_are_logged_and_returned() {
        let (memory, logging) = stack(Level::INFO);
        memory.put("v", 1).unwrap();
        let (result, output) = captured(|| logging.increment("v", 1));

        assert!(matches!(result, Err(Error::NotACounter { .. })));
        assert!(output.contains("NotACounter"));
    }
}
