//! Text exposition handling (line matcher + incremental label injector).
//!
//! The grammar is intentionally narrow: a line is a sample line when it reads
//! `name[{labels}] value...`, everything else (comments, blank lines, samples
//! the grammar does not recognise) is copied byte-for-byte.

pub mod inject;
pub mod series;

pub use inject::{InjectStats, LabelInjector, DEFAULT_MAX_LINE_BYTES};
pub use series::MetricSeries;
