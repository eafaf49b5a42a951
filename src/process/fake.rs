use actix_web::web::Bytes;
use std::{
    ffi::OsStr, os::unix::process::ExitStatusExt, path::PathBuf, process::ExitStatus,
    sync::Mutex,
};

use super::{ProcessError, ProcessRunner};

/// How the fake ffmpeg should treat a remux request
#[derive(Clone, Copy, Debug)]
pub(crate) enum Remux {
    /// Copy the input to the output path, like a stream-copy remux would
    Copy,
    /// Exit non-zero without writing anything
    Fail,
    /// Write a few bytes of output, then exit non-zero
    PartialThenFail,
    /// Report success without ever creating the output file
    SkipOutput,
}

#[derive(Clone, Debug)]
pub(crate) enum Probe {
    Json(String),
    Fail,
}

/// Stands in for ffmpeg and ffprobe so tests don't depend on installed tools
#[derive(Debug)]
pub(crate) struct FakeRunner {
    remux: Remux,
    probe: Probe,
    calls: Mutex<Vec<String>>,
    outputs: Mutex<Vec<PathBuf>>,
}

impl FakeRunner {
    pub(crate) fn new(remux: Remux, probe: Probe) -> Self {
        FakeRunner {
            remux,
            probe,
            calls: Mutex::new(Vec::new()),
            outputs: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn probing(json: &str) -> Self {
        Self::new(Remux::Copy, Probe::Json(json.to_string()))
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Every path ffmpeg was asked to write to
    pub(crate) fn outputs(&self) -> Vec<PathBuf> {
        self.outputs.lock().unwrap().clone()
    }
}

fn failed(command: &str) -> ProcessError {
    ProcessError::Status(
        command.to_string(),
        ExitStatus::from_raw(1 << 8),
        String::from("fake failure"),
    )
}

fn paths(args: &[&OsStr]) -> (PathBuf, PathBuf) {
    let input = args
        .iter()
        .position(|arg| *arg == "-i")
        .map(|idx| PathBuf::from(args[idx + 1]))
        .expect("Input path present");
    let output = PathBuf::from(args.last().expect("Output path present"));

    (input, output)
}

#[async_trait::async_trait(?Send)]
impl ProcessRunner for FakeRunner {
    async fn run(&self, command: &str, args: &[&OsStr]) -> Result<Bytes, ProcessError> {
        self.calls.lock().unwrap().push(command.to_string());

        match command {
            "ffmpeg" => {
                let (input, output) = paths(args);
                self.outputs.lock().unwrap().push(output.clone());

                match self.remux {
                    Remux::Copy => {
                        std::fs::copy(input, output).map_err(ProcessError::Other)?;
                        Ok(Bytes::new())
                    }
                    Remux::Fail => Err(failed(command)),
                    Remux::PartialThenFail => {
                        std::fs::write(output, b"moov").map_err(ProcessError::Other)?;
                        Err(failed(command))
                    }
                    Remux::SkipOutput => Ok(Bytes::new()),
                }
            }
            "ffprobe" => match &self.probe {
                Probe::Json(json) => {
                    let path = PathBuf::from(args.last().expect("Probed path present"));
                    assert!(path.exists(), "ffprobe called on missing file {path:?}");

                    Ok(Bytes::from(json.clone()))
                }
                Probe::Fail => Err(failed(command)),
            },
            other => Err(ProcessError::NotFound(other.to_string())),
        }
    }
}
