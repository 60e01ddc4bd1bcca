use std::io;
use std::path::PathBuf;

use derive_more::{Display, Error, From};
use pianolight_render_lib::TransportError;

/// Everything that can end a `pianolight` run with a non-zero exit code.
#[derive(Debug, Display, Error, From)]
pub enum HostError {
    #[display("cannot read config {}: {source}", path.display())]
    #[from(ignore)]
    ConfigRead { path: PathBuf, source: io::Error },
    #[display("invalid config {}: {source}", path.display())]
    #[from(ignore)]
    ConfigParse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[display("invalid configuration: {reason}")]
    #[from(ignore)]
    Config { reason: String },
    #[display("cannot read palette {}: {source}", path.display())]
    #[from(ignore)]
    PaletteRead { path: PathBuf, source: io::Error },
    #[display("invalid palette {}: {source}", path.display())]
    #[from(ignore)]
    PaletteParse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[display("cannot open output {}: {source}", path.display())]
    #[from(ignore)]
    Output { path: PathBuf, source: io::Error },
    #[display("MIDI: {reason}")]
    #[from(ignore)]
    Midi { reason: String },
    #[display("{_0}")]
    Transport(TransportError),
    #[display("I/O error: {_0}")]
    Io(io::Error),
}

impl HostError {
    pub fn midi(reason: impl std::fmt::Display) -> Self {
        Self::Midi {
            reason: reason.to_string(),
        }
    }
}
