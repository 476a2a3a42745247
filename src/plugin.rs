//! Fit functions supplied by externally compiled plugins.
//!
//! A plugin is anything implementing the narrow [`PluginFunctions`] trait. The
//! dynamic loader (feature `plugins`) adapts a shared library exporting the
//! C ABI below; hosts may also implement the trait in-process.
//!
//! | symbol                 | signature                                                        | required |
//! |------------------------|------------------------------------------------------------------|----------|
//! | `fit_evaluate`         | `fn(x: f64, params: *const f64, n: usize) -> f64`                 | yes      |
//! | `fit_parameter_names`  | `fn() -> *const c_char`, comma separated                         | yes      |
//! | `fit_jacobian`         | `fn(x: f64, params: *const f64, n: usize, out: *mut f64) -> i32` | no       |
//! | `fit_numeric_jacobian` | `fn() -> i32`, non-zero requests finite differences              | no       |
//! | `fit_name`             | `fn() -> *const c_char`                                          | no       |
//! | `fit_guess`            | `fn(x, y: *const f64, points: usize, out: *mut f64, n: usize) -> i32` | no  |
//!
//! A plugin with neither `fit_jacobian` nor a numeric-differencing flag can only
//! be fitted with the simplex algorithm.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::data::FilteredData;
use crate::model::{JacobianSource, ModelFunction};

/// Symbol whose absence makes a plugin unusable with gradient-based algorithms.
pub const JACOBIAN_SYMBOL: &str = "fit_jacobian";

/// The functions a plugin provides.
pub trait PluginFunctions: Send + Sync {
    /// Evaluate the model at `x`; NaN if undefined.
    fn evaluate(&self, x: f64, params: &[f64]) -> f64;

    /// Whether [`PluginFunctions::jacobian`] computes analytic derivatives.
    fn has_jacobian(&self) -> bool {
        false
    }

    /// Whether the plugin asks for finite-difference derivatives.
    fn numeric_jacobian(&self) -> bool {
        false
    }

    /// Write `df/dp_j` at `x` into `out`; `false` on failure.
    fn jacobian(&self, _x: f64, _params: &[f64], _out: &mut [f64]) -> bool {
        false
    }

    /// Write starting values into `out`; `false` if the plugin has no heuristic.
    fn initial_guess(&self, _x: &[f64], _y: &[f64], _out: &mut [f64]) -> bool {
        false
    }
}

/// A model backed by plugin functions.
#[derive(Clone)]
pub struct PluginModel {
    name: String,
    parameter_names: Vec<String>,
    path: Option<PathBuf>,
    functions: Arc<dyn PluginFunctions>,
}

impl PluginModel {
    pub fn new(
        name: &str,
        parameter_names: Vec<String>,
        functions: Arc<dyn PluginFunctions>,
    ) -> Self {
        Self {
            name: name.to_string(),
            parameter_names,
            path: None,
            functions,
        }
    }

    /// File the plugin was loaded from, if it came from a shared library.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Whether both models call into the same plugin instance, e.g. two loads
    /// of one library served from the cache.
    pub fn shares_functions(&self, other: &PluginModel) -> bool {
        std::ptr::eq(
            Arc::as_ptr(&self.functions) as *const (),
            Arc::as_ptr(&other.functions) as *const (),
        )
    }
}

impl fmt::Debug for PluginModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginModel")
            .field("name", &self.name)
            .field("parameter_names", &self.parameter_names)
            .field("path", &self.path)
            .field("jacobian", &self.jacobian_source())
            .finish()
    }
}

impl ModelFunction for PluginModel {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn formula(&self) -> String {
        match &self.path {
            Some(path) => format!("y = {}(x) from {}", self.name, path.display()),
            None => format!("y = {}(x)", self.name),
        }
    }

    fn parameter_names(&self) -> Vec<String> {
        self.parameter_names.clone()
    }

    fn evaluate(&self, x: f64, params: &[f64]) -> f64 {
        self.functions.evaluate(x, params)
    }

    fn jacobian(&self, x: f64, params: &[f64], out: &mut [f64]) -> bool {
        self.functions.has_jacobian() && self.functions.jacobian(x, params, out)
    }

    fn jacobian_source(&self) -> JacobianSource {
        if self.functions.has_jacobian() {
            JacobianSource::Analytic
        } else if self.functions.numeric_jacobian() {
            JacobianSource::Numeric
        } else {
            JacobianSource::Unavailable
        }
    }

    fn initial_guess(&self, data: &FilteredData) -> Vec<f64> {
        let mut guess = vec![1.0; self.parameter_names.len()];
        let x = data.x().to_vec();
        let y = data.y().to_vec();
        if self.functions.initial_guess(&x, &y, &mut guess) {
            guess
        } else {
            vec![1.0; self.parameter_names.len()]
        }
    }
}

#[cfg(feature = "plugins")]
pub use self::dynamic::{clear_plugin_cache, load_plugin};

#[cfg(feature = "plugins")]
mod dynamic {
    use libloading::Library;
    use log::{debug, info};
    use std::collections::HashMap;
    use std::ffi::{c_char, CStr};
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, Mutex, OnceLock};

    use super::{PluginFunctions, PluginModel};
    use crate::error::ModelError;

    type EvaluateFn = unsafe extern "C" fn(f64, *const f64, usize) -> f64;
    type JacobianFn = unsafe extern "C" fn(f64, *const f64, usize, *mut f64) -> i32;
    type FlagFn = unsafe extern "C" fn() -> i32;
    type StringFn = unsafe extern "C" fn() -> *const c_char;
    type GuessFn = unsafe extern "C" fn(*const f64, *const f64, usize, *mut f64, usize) -> i32;

    /// Entry points resolved from one shared library.
    struct DynamicPlugin {
        evaluate: EvaluateFn,
        jacobian: Option<JacobianFn>,
        numeric: bool,
        guess: Option<GuessFn>,
        // Keeps the function pointers above valid.
        _library: Library,
    }

    impl PluginFunctions for DynamicPlugin {
        fn evaluate(&self, x: f64, params: &[f64]) -> f64 {
            // SAFETY: the library is kept loaded and reads exactly `params.len()` values.
            unsafe { (self.evaluate)(x, params.as_ptr(), params.len()) }
        }

        fn has_jacobian(&self) -> bool {
            self.jacobian.is_some()
        }

        fn numeric_jacobian(&self) -> bool {
            self.numeric
        }

        fn jacobian(&self, x: f64, params: &[f64], out: &mut [f64]) -> bool {
            match self.jacobian {
                // SAFETY: `out` holds one slot per parameter.
                Some(f) => unsafe { f(x, params.as_ptr(), params.len(), out.as_mut_ptr()) != 0 },
                None => false,
            }
        }

        fn initial_guess(&self, x: &[f64], y: &[f64], out: &mut [f64]) -> bool {
            match self.guess {
                // SAFETY: `x` and `y` have the same length; `out` has `out.len()` slots.
                Some(f) => unsafe {
                    f(x.as_ptr(), y.as_ptr(), x.len().min(y.len()), out.as_mut_ptr(), out.len())
                        != 0
                },
                None => false,
            }
        }
    }

    fn cache() -> &'static Mutex<HashMap<PathBuf, PluginModel>> {
        static CACHE: OnceLock<Mutex<HashMap<PathBuf, PluginModel>>> = OnceLock::new();
        CACHE.get_or_init(|| Mutex::new(HashMap::new()))
    }

    /// Load a plugin library, or return the cached model if the same file was
    /// loaded before in this process.
    ///
    /// # Errors
    ///
    /// * `ModelError::PluginFileNotFound` if `path` does not exist
    /// * `ModelError::PluginLoad` if the library cannot be opened
    /// * `ModelError::PluginMissingSymbol` if `fit_evaluate` or `fit_parameter_names` is missing
    /// * `ModelError::InvalidPluginMetadata` if the names are empty or not UTF-8
    pub fn load_plugin(path: impl AsRef<Path>) -> Result<PluginModel, ModelError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(ModelError::PluginFileNotFound(path.to_path_buf()));
        }
        let key = path
            .canonicalize()
            .map_err(|_| ModelError::PluginFileNotFound(path.to_path_buf()))?;

        let mut cache = cache().lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(model) = cache.get(&key) {
            debug!("Plugin {} served from cache", key.display());
            return Ok(model.clone());
        }

        let model = open(&key)?;
        info!(
            "Loaded plugin '{}' from {} ({:?} Jacobian)",
            model.name,
            key.display(),
            crate::model::ModelFunction::jacobian_source(&model)
        );
        cache.insert(key, model.clone());
        Ok(model)
    }

    /// Forget every cached plugin. Libraries stay loaded while models using them exist.
    pub fn clear_plugin_cache() {
        cache()
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }

    fn open(path: &Path) -> Result<PluginModel, ModelError> {
        let plugin_name = path
            .file_stem()
            .map(|s| s.to_string_lossy().trim_start_matches("lib").to_string())
            .unwrap_or_else(|| "plugin".to_string());

        // SAFETY: loading runs the library's initializers; plugins are trusted code.
        let library = unsafe { Library::new(path) }.map_err(|err| ModelError::PluginLoad {
            path: path.to_path_buf(),
            source: Box::new(err),
        })?;

        let missing = |symbol: &str| ModelError::PluginMissingSymbol {
            plugin: plugin_name.clone(),
            symbol: symbol.to_string(),
        };

        // SAFETY: symbol types follow the documented plugin ABI.
        let (evaluate, names_fn, jacobian, numeric_fn, name_fn, guess) = unsafe {
            let evaluate = *library
                .get::<EvaluateFn>(b"fit_evaluate\0")
                .map_err(|_| missing("fit_evaluate"))?;
            let names_fn = *library
                .get::<StringFn>(b"fit_parameter_names\0")
                .map_err(|_| missing("fit_parameter_names"))?;
            let jacobian = library.get::<JacobianFn>(b"fit_jacobian\0").ok().map(|s| *s);
            let numeric_fn = library
                .get::<FlagFn>(b"fit_numeric_jacobian\0")
                .ok()
                .map(|s| *s);
            let name_fn = library.get::<StringFn>(b"fit_name\0").ok().map(|s| *s);
            let guess = library.get::<GuessFn>(b"fit_guess\0").ok().map(|s| *s);
            (evaluate, names_fn, jacobian, numeric_fn, name_fn, guess)
        };

        let invalid = |message: &str| ModelError::InvalidPluginMetadata {
            plugin: plugin_name.clone(),
            message: message.to_string(),
        };

        // SAFETY: the plugin returns a NUL-terminated static string.
        let names = unsafe { read_c_string(names_fn()) }.ok_or_else(|| invalid("parameter names"))?;
        let parameter_names: Vec<String> = names
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if parameter_names.is_empty() {
            return Err(invalid("no parameter names"));
        }

        let name = match name_fn {
            // SAFETY: as above.
            Some(f) => unsafe { read_c_string(f()) }.ok_or_else(|| invalid("name"))?,
            None => plugin_name.clone(),
        };
        // SAFETY: the flag function takes no arguments.
        let numeric = numeric_fn.map_or(false, |f| unsafe { f() } != 0);

        let functions = DynamicPlugin {
            evaluate,
            jacobian,
            numeric,
            guess,
            _library: library,
        };

        let mut model = PluginModel::new(&name, parameter_names, Arc::new(functions));
        model.path = Some(path.to_path_buf());
        Ok(model)
    }

    unsafe fn read_c_string(ptr: *const c_char) -> Option<String> {
        if ptr.is_null() {
            return None;
        }
        CStr::from_ptr(ptr).to_str().ok().map(str::to_string)
    }
}
