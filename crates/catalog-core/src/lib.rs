pub mod error;
pub mod id;
pub mod schema;
pub mod timestamp;

pub use error::{CoreError, ErrorCategory, Result};
pub use id::{allocate_id, format_id, parse_suffix};
pub use schema::{Activation, EntitySchema, FieldKind, FieldSpec};
pub use timestamp::{Timestamp, compare_rfc3339, now_utc};
