//! Generation tasks over the shared session store.
//!
//! [`Generator`] owns a [`SharedStore`](crate::store::SharedStore) and the
//! external [`Services`]; every operation follows the begin / call / finish
//! ticket protocol so results for deleted or superseded entities are dropped.

pub mod error;
pub mod generator;

pub use error::TaskError;
pub use generator::{BatchPolicy, BatchReport, Generator, Models, Services, TaskOutcome};
