use pyo3::exceptions::{PyConnectionError, PyRuntimeError, PyTypeError, PyValueError};
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList, PyTuple, PyType};
use pyo3_async_runtimes::tokio::future_into_py;
use serde_json::Value;

use crate::{Arg, CacheConfig, CacheError, Cacher, Calculator, ReadFailurePolicy, RedisStore};

// ============ JSON conversion helpers ============

/// Convert a serde_json::Value to a Python object
fn json_value_to_py(py: Python<'_>, v: &Value) -> PyResult<Py<PyAny>> {
    match v {
        Value::Null => Ok(py.None()),
        Value::Bool(b) => Ok(b.into_pyobject(py)?.to_owned().into_any().unbind()),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i.into_pyobject(py)?.into_any().unbind())
            } else if let Some(u) = n.as_u64() {
                Ok(u.into_pyobject(py)?.into_any().unbind())
            } else if let Some(f) = n.as_f64() {
                Ok(f.into_pyobject(py)?.into_any().unbind())
            } else {
                Ok(py.None())
            }
        }
        Value::String(s) => Ok(s.into_pyobject(py)?.into_any().unbind()),
        Value::Array(arr) => {
            let list = PyList::empty(py);
            for item in arr {
                list.append(json_value_to_py(py, item)?)?;
            }
            Ok(list.into_any().unbind())
        }
        Value::Object(obj) => {
            let dict = PyDict::new(py);
            for (k, val) in obj {
                dict.set_item(k, json_value_to_py(py, val)?)?;
            }
            Ok(dict.into_any().unbind())
        }
    }
}

/// Convert a Python object to serde_json::Value via `json.dumps`.
///
/// `None` maps to `null`. Objects `json` cannot encode (dates, sets, NaN)
/// raise `TypeError`, the same error an invalid key or sub-key gets.
fn py_to_json_value(py: Python<'_>, obj: &Bound<'_, PyAny>) -> PyResult<Value> {
    if obj.is_none() {
        return Ok(Value::Null);
    }
    let json_mod = py.import("json")?;
    let json_str: String = json_mod
        .call_method1("dumps", (obj,))
        .and_then(|s| s.extract())
        .map_err(|e| PyTypeError::new_err(format!("unsupported fetch argument: {e}")))?;
    serde_json::from_str(&json_str)
        .map_err(|e| PyTypeError::new_err(format!("unsupported fetch argument: {e}")))
}

fn cache_error_to_py(e: CacheError) -> PyErr {
    match e {
        CacheError::InvalidArgument(message) => PyTypeError::new_err(message),
        // Re-raise the calculator's own exception when it came from Python.
        CacheError::Calculation(source) => match source.downcast::<PyErr>() {
            Ok(err) => *err,
            Err(other) => PyRuntimeError::new_err(other.to_string()),
        },
        CacheError::StoreUnavailable(e) => PyConnectionError::new_err(e.to_string()),
    }
}

// ============ Calculators ============

/// Run a Python calculator from a tokio context.
///
/// The callable is invoked without arguments. If it returns a coroutine, the
/// coroutine is scheduled on the captured asyncio event loop via
/// `asyncio.run_coroutine_threadsafe` and the call blocks (releasing the GIL)
/// until the result is available.
async fn call_python_calculator(
    callable: Py<PyAny>,
    event_loop: Py<PyAny>,
) -> PyResult<Py<PyAny>> {
    tokio::task::spawn_blocking(move || {
        Python::attach(|py| {
            let returned = callable.call0(py)?;
            let is_coroutine: bool = py
                .import("inspect")?
                .call_method1("iscoroutine", (returned.bind(py),))?
                .extract()?;
            if !is_coroutine {
                return Ok(returned);
            }
            let asyncio = py.import("asyncio")?;
            let cf = asyncio.call_method1(
                "run_coroutine_threadsafe",
                (returned.bind(py), event_loop.bind(py)),
            )?;
            cf.call_method0("result").map(|r| r.unbind())
        })
    })
    .await
    .map_err(|e| PyRuntimeError::new_err(e.to_string()))?
}

fn py_calculator(callable: Py<PyAny>, event_loop: Py<PyAny>) -> Calculator {
    Calculator::new(move || async move {
        let result = call_python_calculator(callable, event_loop).await?;
        let value = Python::attach(|py| py_to_json_value(py, result.bind(py)))?;
        Ok::<Value, crate::BoxError>(value)
    })
}

// ============ Classes ============

/// Cacher configuration
#[pyclass(name = "CacheConfig")]
#[derive(Clone)]
pub struct PyCacheConfig {
    inner: CacheConfig,
}

#[pymethods]
impl PyCacheConfig {
    #[new]
    #[pyo3(signature = (prefix="cacher:".to_owned(), expires=300, fail_closed=false))]
    fn new(prefix: String, expires: u64, fail_closed: bool) -> PyResult<Self> {
        if expires == 0 {
            return Err(PyValueError::new_err("expires should be a positive number of seconds"));
        }
        let read_failure = if fail_closed {
            ReadFailurePolicy::FailClosed
        } else {
            ReadFailurePolicy::FailOpen
        };
        Ok(Self {
            inner: CacheConfig {
                prefix,
                expires,
                read_failure,
            },
        })
    }

    fn __repr__(&self) -> String {
        format!(
            "CacheConfig(prefix='{}', expires={}, read_failure={:?})",
            self.inner.prefix, self.inner.expires, self.inner.read_failure
        )
    }
}

/// Cache-aside accessor backed by Redis
#[pyclass(name = "Cacher")]
pub struct PyCacher {
    inner: Cacher<RedisStore>,
}

#[pymethods]
impl PyCacher {
    /// Create a new Cacher.
    ///
    /// Args:
    ///     redis_url: Redis connection URL (e.g. "redis://localhost:6379")
    ///     config: CacheConfig instance
    #[classmethod]
    fn create<'py>(
        _cls: &Bound<'py, PyType>,
        py: Python<'py>,
        redis_url: String,
        config: PyCacheConfig,
    ) -> PyResult<Bound<'py, PyAny>> {
        future_into_py(py, async move {
            let redis_client = redis::Client::open(redis_url.as_str())
                .map_err(|e| PyConnectionError::new_err(e.to_string()))?;
            let store = RedisStore::new(redis_client)
                .await
                .map_err(|e| PyConnectionError::new_err(e.to_string()))?;

            Ok(PyCacher {
                inner: Cacher::new(store, config.inner).map_err(cache_error_to_py)?,
            })
        })
    }

    /// Fetch a value: `fetch(key, sub_key=None, calculator=None)` positionally.
    ///
    /// `key` is a str, a number or a dict with a `title` (and optional
    /// `expires`). A calculator is any callable taking no arguments; it may be
    /// a coroutine function. Returns the cached or calculated value, or None.
    #[pyo3(signature = (*args))]
    fn fetch<'py>(&self, py: Python<'py>, args: &Bound<'py, PyTuple>) -> PyResult<Bound<'py, PyAny>> {
        let event_loop = py
            .import("asyncio")?
            .call_method0("get_running_loop")?
            .unbind();

        // Conversion errors reject the returned awaitable, like every other fetch error
        let fetch_args: PyResult<Vec<Arg>> = args
            .iter()
            .map(|arg| {
                if arg.is_callable() {
                    Ok(Arg::Calculator(py_calculator(
                        arg.unbind(),
                        event_loop.clone_ref(py),
                    )))
                } else {
                    py_to_json_value(py, &arg).map(Arg::Value)
                }
            })
            .collect();

        let cacher = self.inner.clone();
        future_into_py(py, async move {
            let fetch_args = fetch_args?;
            let value = cacher
                .fetch_args(fetch_args)
                .await
                .map_err(cache_error_to_py)?;
            Python::attach(|py| json_value_to_py(py, &value))
        })
    }

    /// Derived Redis key for `key` and an optional sub-key
    #[pyo3(signature = (key, sub_key=None))]
    fn key_for(
        &self,
        py: Python<'_>,
        key: &Bound<'_, PyAny>,
        sub_key: Option<&Bound<'_, PyAny>>,
    ) -> PyResult<String> {
        let mut args = vec![Arg::Value(py_to_json_value(py, key)?)];
        if let Some(sub_key) = sub_key {
            args.push(Arg::Value(py_to_json_value(py, sub_key)?));
        }
        let request = crate::FetchRequest::from_args(args).map_err(cache_error_to_py)?;
        self.inner.key_for(request).map_err(cache_error_to_py)
    }
}

// ============ Module Registration ============

pub fn register(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyCacheConfig>()?;
    m.add_class::<PyCacher>()?;
    Ok(())
}

#[pymodule]
fn redis_cacher(m: &Bound<'_, PyModule>) -> PyResult<()> {
    register(m)
}
