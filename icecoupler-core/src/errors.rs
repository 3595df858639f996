use log::error;
use thiserror::Error;

/// Error type for coupling operations.
///
/// Variants fall into three groups:
///
/// - setup errors (bad contracts, recipes, geometry or shapes) which are
///   discovered before any timestep runs,
/// - data errors (e.g. [`CouplingError::ZeroArea`]) which are usually collected
///   into an [`ErrorList`] so that a whole batch can be reported at once,
/// - per-timestep errors raised while an ice sheet is being coupled.
#[derive(Error, Debug)]
pub enum CouplingError {
    #[error("{0}")]
    Error(String),
    #[error("Field '{name}' is already present in the contract")]
    DuplicateField { name: String },
    #[error("Name '{name}' not found in {context}")]
    UnknownField { context: String, name: String },
    #[error("The {0} axis of the transformer is already bound")]
    AxisAlreadyBound(String),
    #[error("The {0} axis of the transformer has not been bound")]
    AxisUnbound(String),
    #[error("The transformer has not been allocated")]
    NotAllocated,
    #[error("{what} has the wrong size: {found} (vs {expected} expected)")]
    ShapeMismatch {
        what: String,
        expected: usize,
        found: usize,
    },
    #[error("Index {index} is out of bounds for {what} (extent {extent})")]
    IndexOutOfBounds {
        what: String,
        index: usize,
        extent: usize,
    },
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),
    #[error("Constant '{0}' is not defined")]
    UnknownConstant(String),
    #[error("Cannot parse unit '{unit}': {details}")]
    UnitParse { unit: String, details: String },
    #[error("Cannot convert '{from}' to '{to}': {details}")]
    UnitConversion {
        from: String,
        to: String,
        details: String,
    },
    #[error("Elevation point {index} has zero accumulated ice area")]
    ZeroArea { index: usize },
    #[error("Unrecognized ice model kind '{0}'")]
    UnknownModelKind(String),
    #[error("Invalid specification '{spec}': {details}")]
    InvalidSpec { spec: String, details: String },
    #[error("Ice sheet '{sheet}' cannot {operation} while {state}")]
    InvalidState {
        sheet: String,
        operation: String,
        state: String,
    },
    #[error("The simulation start time has already been set")]
    StartTimeAlreadySet,
    #[error("Ice model for sheet '{sheet}' failed: {message}")]
    IceModel { sheet: String, message: String },
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("{} errors encountered, first: {}", .0.len(), .0.first().map(|e| e.to_string()).unwrap_or_default())]
    Multiple(Vec<CouplingError>),
}

/// Convenience type for `Result<T, CouplingError>`.
pub type CouplingResult<T> = Result<T, CouplingError>;

/// Collects errors so that every problem in a batch is surfaced before the caller
/// decides whether to abort.
#[derive(Debug, Default)]
pub struct ErrorList {
    errors: Vec<CouplingError>,
}

impl ErrorList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, err: CouplingError) {
        self.errors.push(err);
    }

    /// Record the error of a failed result, returning the success value if any
    pub fn check<T>(&mut self, result: CouplingResult<T>) -> Option<T> {
        match result {
            Ok(v) => Some(v),
            Err(e) => {
                self.errors.push(e);
                None
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CouplingError> {
        self.errors.iter()
    }

    pub fn extend(&mut self, other: ErrorList) {
        self.errors.extend(other.errors);
    }

    /// Log every collected error
    pub fn report(&self) {
        for err in &self.errors {
            error!("{}", err);
        }
    }

    /// Ok if nothing was collected, otherwise a single combined error.
    ///
    /// A lone error is returned as-is rather than wrapped.
    pub fn into_result(mut self) -> CouplingResult<()> {
        match self.errors.len() {
            0 => Ok(()),
            1 => Err(self.errors.remove(0)),
            _ => Err(CouplingError::Multiple(self.errors)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_list_is_ok() {
        let errors = ErrorList::new();
        assert!(errors.is_empty());
        assert!(errors.into_result().is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut errors = ErrorList::new();
        let ok: CouplingResult<i32> = Ok(3);
        assert_eq!(errors.check(ok), Some(3));
        errors.check::<()>(Err(CouplingError::UnknownModelKind("netcdf".to_string())));
        errors.check::<()>(Err(CouplingError::ZeroArea { index: 4 }));
        assert_eq!(errors.len(), 2);

        match errors.into_result() {
            Err(CouplingError::Multiple(all)) => {
                assert_eq!(all.len(), 2);
                assert!(matches!(all[1], CouplingError::ZeroArea { index: 4 }));
            }
            other => panic!("Expected Multiple, got {:?}", other),
        }
    }

    #[test]
    fn test_single_error_is_not_wrapped() {
        let mut errors = ErrorList::new();
        errors.push(CouplingError::StartTimeAlreadySet);
        assert!(matches!(
            errors.into_result(),
            Err(CouplingError::StartTimeAlreadySet)
        ));
    }
}
