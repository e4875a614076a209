pub mod month;
pub mod rank;
pub mod schema;
pub mod table;

pub use month::MonthLabel;
pub use rank::{is_legal_rank, MonthData, Rank, RankMap, ABSENT, MAX_RANK};
pub use schema::{Column, Schema, SEARCH_TERM_HEADER};
pub use table::{AnchorRow, PivotTable, Row};
