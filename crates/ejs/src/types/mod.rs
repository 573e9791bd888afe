//! Small self-contained numeric/string conversion helpers shared by
//! [`crate::jsvar`] and [`crate::json`] — the ECMAScript ToNumber/ToString
//! leaf rules that don't belong to any one component letter in §4 but are
//! needed by several (B, D, N).

pub(crate) mod numfmt;
