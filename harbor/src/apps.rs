//! Connection handlers the server can run.

use std::sync::Arc;

use anyhow::Context;
use harbor_net::{ByteBuffer, ConnectionHandler, HandlerFactory};
use harbor_regex::Regex;
use tracing::debug;

use crate::config::AppConfig;

/// Echo every byte straight back.
pub struct EchoHandler;

impl ConnectionHandler for EchoHandler {
    fn poll(&mut self, read: &mut ByteBuffer, write: &mut ByteBuffer) {
        let mut chunk = [0u8; 512];
        loop {
            let n = read.read(&mut chunk);
            if n == 0 {
                break;
            }
            write.append(&chunk[..n]);
        }
    }
}

/// Stream newline-delimited input, forwarding only the lines the pattern
/// matches. Bytes after the last newline are held until the line completes.
pub struct LineFilterHandler {
    pattern: Arc<Regex>,
    partial: Vec<u8>,
}

impl LineFilterHandler {
    pub fn new(pattern: Arc<Regex>) -> Self {
        LineFilterHandler {
            pattern,
            partial: Vec::new(),
        }
    }

    fn finish_line(&mut self, write: &mut ByteBuffer) {
        if self.pattern.is_match(&self.partial) {
            write.append(&self.partial);
            write.append(b"\n");
        }
        self.partial.clear();
    }
}

impl ConnectionHandler for LineFilterHandler {
    fn poll(&mut self, read: &mut ByteBuffer, write: &mut ByteBuffer) {
        let mut chunk = [0u8; 512];
        loop {
            let n = read.read(&mut chunk);
            if n == 0 {
                break;
            }
            for &byte in &chunk[..n] {
                if byte == b'\n' {
                    self.finish_line(write);
                } else {
                    self.partial.push(byte);
                }
            }
        }
    }
}

/// Resolve the configured application to a per-connection handler factory.
pub fn factory_for(config: &AppConfig) -> anyhow::Result<HandlerFactory> {
    match config {
        AppConfig::Echo => Ok(Box::new(|| Box::new(EchoHandler))),
        AppConfig::LineFilter { pattern } => {
            let regex = Arc::new(
                Regex::new(pattern)
                    .with_context(|| format!("compiling line filter pattern {pattern:?}"))?,
            );
            debug!(pattern, groups = regex.group_count(), "line filter compiled");
            Ok(Box::new(move || {
                Box::new(LineFilterHandler::new(Arc::clone(&regex)))
            }))
        }
    }
}
