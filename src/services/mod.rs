//! Services that keep file I/O apart from pipeline logic

pub mod io;

pub use io::ImageIOService;
