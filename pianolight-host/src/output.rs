use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use log::info;

use crate::error::HostError;

/// Open the Adalight sink: `-` is stdout, anything else a file or serial
/// device (line settings are left to `stty`).
///
/// The sink is unbuffered. Each frame is already assembled into one
/// `write_all`, and a buffered sink would keep the bytes of a failed frame
/// and send them ahead of the next one.
pub fn open(path: &Path) -> Result<Box<dyn Write + Send>, HostError> {
    if path.as_os_str() == "-" {
        info!("Writing Adalight frames to stdout");
        return stdout();
    }
    let file = File::create(path).map_err(|source| HostError::Output {
        path: path.to_path_buf(),
        source,
    })?;
    info!("Writing Adalight frames to {}", path.display());
    Ok(Box::new(file))
}

/// Stdout without the standard library's line buffer.
#[cfg(unix)]
fn stdout() -> Result<Box<dyn Write + Send>, HostError> {
    use std::os::fd::AsFd;

    let fd = io::stdout().as_fd().try_clone_to_owned()?;
    Ok(Box::new(File::from(fd)))
}

#[cfg(not(unix))]
fn stdout() -> Result<Box<dyn Write + Send>, HostError> {
    Ok(Box::new(io::stdout()))
}
