pub mod filename;
pub mod rank_file;
pub mod scan;

pub use filename::month_from_filename;
pub use rank_file::{read_rank_csv, read_rank_file};
pub use scan::{list_countries, scan_country, FileRankSource};
