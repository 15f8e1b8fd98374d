use crate::IngestResult;
use memchr::{memchr, memchr_iter};
use memmap2::MmapOptions;
use std::fs::File;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

/// Fast pre-pass for uncompressed UTF-8 files using mmap and parallel chunking.
///
/// Counts data lines after the header. Assumes no embedded line breaks inside
/// quoted fields, which holds for the Majestic Million export.
pub fn count_lines_local(path: &Path, line_break: u8) -> IngestResult<u64> {
    let file = File::open(path)?;
    let len = file.metadata()?.len() as usize;
    if len == 0 {
        return Ok(0);
    }
    // SAFETY: the file is opened read-only and only scanned; a concurrent writer
    // can at worst skew the count, which the driver tolerates.
    let mmap = unsafe { MmapOptions::new().map(&file)? };
    let data: &[u8] = &mmap[..];

    let body_start = match memchr(line_break, data) {
        Some(end) => end + 1,
        None => return Ok(0),
    };
    if body_start >= len {
        return Ok(0);
    }

    // split the body at line boundaries, one chunk per core
    let cores = num_cpus::get().max(1);
    let approx = ((len - body_start) / cores).max(1);
    let mut starts = vec![body_start];
    while starts.len() < cores {
        let pos = body_start + starts.len() * approx;
        if pos >= len {
            break;
        }
        let next = memchr(line_break, &data[pos..])
            .map(|off| pos + off + 1)
            .unwrap_or(len);
        if next > *starts.last().unwrap_or(&body_start) && next < len {
            starts.push(next);
        } else {
            break;
        }
    }
    starts.push(len);

    let total = AtomicU64::new(0);
    thread::scope(|s| {
        for w in starts.windows(2) {
            let slice = &data[w[0]..w[1]];
            let total = &total;
            s.spawn(move || {
                let lines = memchr_iter(line_break, slice).count() as u64;
                total.fetch_add(lines, Ordering::Relaxed);
            });
        }
    });

    let mut rows = total.load(Ordering::Relaxed);
    // last line without a trailing break
    if data[len - 1] != line_break {
        rows += 1;
    }
    Ok(rows)
}
