use flate2::Compression;
use flate2::write::{DeflateEncoder, GzEncoder};
use std::io::Write;

use crate::handler::responses::Reply;
use crate::log::Logger;

// Algorithm used for body compression as listed in MDN
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionAlgorithm {
    Gzip,
    Deflate,
    Identity,
}

impl CompressionAlgorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompressionAlgorithm::Gzip => "gzip",
            CompressionAlgorithm::Deflate => "deflate",
            CompressionAlgorithm::Identity => "identity",
        }
    }

    /// Picks the first supported algorithm the client lists, ignoring
    /// quality weights.
    pub fn negotiate(accept_encoding: &str) -> CompressionAlgorithm {
        accept_encoding
            .split(',')
            .filter_map(|token| token.split(';').next())
            .map(str::trim)
            .find_map(|token| match token {
                "gzip" => Some(CompressionAlgorithm::Gzip),
                "deflate" => Some(CompressionAlgorithm::Deflate),
                _ => None,
            })
            .unwrap_or(CompressionAlgorithm::Identity)
    }
}

/// Compresses the reply body when the client accepts it.
pub fn apply(accept_encoding: Option<&str>, reply: &mut Reply, log: &Logger) {
    let Some(accept_encoding) = accept_encoding else {
        return;
    };
    if reply.body.is_empty() || reply.content_encoding.is_some() {
        return;
    }

    let algo = CompressionAlgorithm::negotiate(accept_encoding);
    if algo == CompressionAlgorithm::Identity {
        return;
    }
    if let Err(err) = compress_body(reply, algo) {
        log.emit(|| tracing::warn!(error = %err, "Compression IO error"));
    }
}

fn compress_body(reply: &mut Reply, algo: CompressionAlgorithm) -> std::io::Result<()> {
    let body = match algo {
        CompressionAlgorithm::Gzip => {
            let mut e = GzEncoder::new(Vec::new(), Compression::default());
            e.write_all(&reply.body)?;
            e.finish()?
        }
        CompressionAlgorithm::Deflate => {
            let mut e = DeflateEncoder::new(Vec::new(), Compression::default());
            e.write_all(&reply.body)?;
            e.finish()?
        }
        CompressionAlgorithm::Identity => return Ok(()),
    };

    reply.body = body;
    reply.content_encoding = Some(algo.as_str());
    Ok(())
}
