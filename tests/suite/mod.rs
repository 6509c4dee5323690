mod child_process;
mod config;
mod correlation;
mod diagnostics;
mod framing;
