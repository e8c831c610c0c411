//! Vector field names per collection family
//!
//! The two collections use disjoint vector-name families; nothing ever
//! writes across them.

/// Generic memory collection: semantic field for text content
pub const TEXT_DENSE_FIELD: &str = "text_dense";
/// Generic memory collection: semantic field for code content
pub const CODE_DENSE_FIELD: &str = "code_dense";
/// Generic memory collection: lexical term-weight field
pub const TEXT_SPARSE_FIELD: &str = "text_sparse";
/// Generic memory collection: late-interaction field (optional)
pub const TEXT_COLBERT_FIELD: &str = "text_colbert";

/// Turn collection fields
pub const TURN_DENSE_FIELD: &str = "turn_dense";
pub const TURN_SPARSE_FIELD: &str = "turn_sparse";
pub const TURN_COLBERT_FIELD: &str = "turn_colbert";

/// Fixed similarity threshold for conflict-candidate lookups
pub const CONFLICT_SCORE_THRESHOLD: f32 = 0.65;
/// Fixed result limit for conflict-candidate lookups
pub const CONFLICT_LIMIT: usize = 10;
