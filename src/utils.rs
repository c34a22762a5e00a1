use std::{fs, io};
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::time::{Duration, Instant};

pub(crate) fn file_to_vec(filename: &Path) -> io::Result<Vec<String>> {
    let file_in = fs::File::open(filename)?;
    let file_reader = BufReader::new(file_in);
    file_reader
        .lines()
        .map(|line| line.map(|l| l.trim().to_string()))
        .filter(|line| !matches!(line, Ok(l) if l.is_empty()))
        .collect()
}

pub(crate) fn trace(l_type: &str, l_step: &str, start: Instant, previous: Duration) -> Duration {
    log::trace!("{} | Total={:.2?} | {}={:.2?}", l_type, start.elapsed(), l_step, start.elapsed() - previous);
    start.elapsed()
}

pub(crate) fn human_bytes(size: f64) -> String {
    let units = ["B", "KB", "MB", "GB", "TB", "PB", "EB"];
    let mut size = size;
    let mut unit_index = 0;
    let k = 1024.;

    while size >= k && unit_index < units.len() - 1 {
        size /= k;
        unit_index += 1;
    }

    format!("{:.1} {}", size, units[unit_index])
}
