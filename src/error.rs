use thiserror::Error;

/// Errors caused by the data or configuration handed to a fit.
///
/// These are always detected before any optimizer is constructed, so a fit that
/// fails with an `InputError` has had no side effects.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InputError {
    /// Fewer points remain after range filtering than the model needs.
    #[error("Insufficient data: the model needs at least {required} points, but only {available} are in range")]
    InsufficientData { required: usize, available: usize },

    /// The x sub-range is empty or reversed.
    #[error("Invalid range: 'from' ({from}) must be smaller than 'to' ({to})")]
    InvalidRange { from: f64, to: f64 },

    /// Instrumental weighting was requested for a curve without y-errors.
    #[error("Instrumental weighting requested, but dataset '{dataset}' has no error column")]
    MissingErrorColumn { dataset: String },

    /// An external error/weight column is shorter than the fitted range.
    #[error("Weighting column has {available} rows, but the fitted range needs {required}")]
    RowCountMismatch { required: usize, available: usize },

    /// The x and y columns of a dataset differ in length.
    #[error("Column length mismatch: x has {x} rows, y has {y}")]
    LengthMismatch { x: usize, y: usize },

    /// A computed weight is negative, infinite or NaN.
    #[error("Invalid weight {value} at row {row}")]
    InvalidWeight { row: usize, value: f64 },

    #[error("Tolerance must lie strictly between 0 and 1, got {0}")]
    InvalidTolerance(f64),

    #[error("Maximum iterations must be between 1 and {cap}, got {value}")]
    InvalidMaxIterations { value: usize, cap: usize },

    #[error("A generated fit curve needs at least 2 points, got {0}")]
    InvalidOutputPoints(usize),

    #[error("Unknown parameter '{0}'")]
    UnknownParameter(String),

    #[error("Invalid bounds for parameter '{name}': min {min} is not below max {max}")]
    InvalidBounds { name: String, min: f64, max: f64 },

    #[error("Expected {expected} initial parameter values, got {actual}")]
    InitialGuessLength { expected: usize, actual: usize },

    #[error("Peak count must be at least 1")]
    InvalidPeakCount,

    #[error("Expected exactly {expected} peak centers, got {actual}")]
    SeedCountMismatch { expected: usize, actual: usize },

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Errors raised while defining, registering or loading a model.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Failed to parse expression '{expression}': {message}")]
    Parse { expression: String, message: String },

    #[error("User function '{name}' references itself (call chain: {chain})")]
    RecursiveDefinition { name: String, chain: String },

    #[error("'{0}' is the name of a built-in function")]
    NameCollision(String),

    #[error("Unknown model '{0}'")]
    UnknownModel(String),

    #[error("Unknown function '{name}' in expression for '{model}'")]
    UnknownFunction { model: String, name: String },

    #[error("Invalid model name '{0}'")]
    InvalidName(String),

    #[error("Invalid built-in model {model}: {message}")]
    InvalidBuiltin { model: String, message: String },

    #[error("Plugin '{plugin}' does not provide symbol '{symbol}'")]
    PluginMissingSymbol { plugin: String, symbol: String },

    #[error("Plugin file not found: {0}")]
    PluginFileNotFound(std::path::PathBuf),

    #[error("Failed to load plugin '{path}': {source}")]
    PluginLoad {
        path: std::path::PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Plugin '{plugin}' returned invalid metadata: {message}")]
    InvalidPluginMetadata { plugin: String, message: String },
}

/// Error types for the curvefit-rs library.
#[derive(Error, Debug)]
pub enum FitError {
    /// Invalid data, range, weighting or configuration.
    #[error(transparent)]
    Input(#[from] InputError),

    /// Invalid, unknown or unloadable model.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Error indicating a mismatch in matrix dimensions.
    #[error("Matrix dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Error indicating a singular matrix was encountered.
    #[error("Singular matrix encountered")]
    SingularMatrix,

    /// Error during function evaluation.
    #[error("Function evaluation error: {0}")]
    FunctionEvaluation(String),

    /// I/O error wrapper.
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl FitError {
    /// Returns the input error if this failure was caused by the fit's inputs.
    pub fn as_input(&self) -> Option<&InputError> {
        match self {
            FitError::Input(err) => Some(err),
            _ => None,
        }
    }

    /// Returns the model error if this failure was caused by the model definition.
    pub fn as_model(&self) -> Option<&ModelError> {
        match self {
            FitError::Model(err) => Some(err),
            _ => None,
        }
    }
}

/// Result type alias for curvefit-rs operations.
pub type Result<T> = std::result::Result<T, FitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FitError::from(InputError::InsufficientData {
            required: 3,
            available: 2,
        });
        assert!(format!("{}", err).contains("at least 3 points"));

        let err = FitError::from(ModelError::NameCollision("gauss".to_string()));
        assert!(format!("{}", err).contains("gauss"));
    }

    #[test]
    fn test_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: FitError = io_err.into();

        match err {
            FitError::IoError(_) => (),
            _ => panic!("Expected IoError variant"),
        }

        let err: FitError = InputError::InvalidRange { from: 2.0, to: 1.0 }.into();
        assert_eq!(
            err.as_input(),
            Some(&InputError::InvalidRange { from: 2.0, to: 1.0 })
        );
        assert!(err.as_model().is_none());
    }
}
