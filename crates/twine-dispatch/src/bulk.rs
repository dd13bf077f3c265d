//! The bulk-import driver: feeds a growing byte buffer to a registered
//! bulk handler one chunk at a time, following the advance-by-offset
//! contract described for C6's bulk mode.

use std::io::Read;

use twine_core::context::Context;
use twine_core::error::{Result, TwineError};
use twine_core::registry::BulkAdvance;

const CHUNK_SIZE: usize = 1024;

/// Run a registered bulk importer for `mime_type` over `reader` to
/// completion.
///
/// Each time a chunk is read, the handler is given the full unconsumed
/// buffer and reports how much of its front it consumed
/// ([`BulkAdvance::Consumed`]) or that it needs more bytes
/// ([`BulkAdvance::NoProgress`]); a consumed count past the end of the
/// buffer is a [`TwineError::ProtocolViolation`]. On EOF with residual
/// bytes the handler is given one more chance to consume them, then
/// called once with an empty buffer to signal end-of-stream so it can
/// finalise. Mirrors `twine_workflow_process_file`'s realloc/advance
/// loop as a `Vec<u8>` drain instead of pointer arithmetic.
pub fn run_bulk_import(ctx: &Context, mime_type: &str, mut reader: impl Read) -> Result<()> {
    {
        let registry = ctx.registry().read().expect("registry lock poisoned");
        if !registry.bulk_exists(mime_type) {
            return Err(TwineError::NoHandler(format!("bulk importer for '{mime_type}'")));
        }
    }

    let mut buffer: Vec<u8> = Vec::new();
    let mut chunk = vec![0u8; CHUNK_SIZE];
    loop {
        let read = reader
            .read(&mut chunk)
            .map_err(|e| TwineError::Transient(format!("bulk import I/O error: {e}")))?;
        if read == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..read]);
        consume_once(ctx, mime_type, &mut buffer)?;
    }
    if !buffer.is_empty() {
        consume_once(ctx, mime_type, &mut buffer)?;
    }

    let registry = ctx.registry().read().expect("registry lock poisoned");
    registry.resolve_bulk(ctx, mime_type, &[])?;
    Ok(())
}

fn consume_once(ctx: &Context, mime_type: &str, buffer: &mut Vec<u8>) -> Result<()> {
    let advance = {
        let registry = ctx.registry().read().expect("registry lock poisoned");
        registry.resolve_bulk(ctx, mime_type, buffer)?
    };
    match advance {
        BulkAdvance::NoProgress => Ok(()),
        BulkAdvance::Consumed(n) => {
            if n > buffer.len() {
                return Err(TwineError::ProtocolViolation(format!(
                    "bulk importer reported consuming {n} bytes from a buffer of {}",
                    buffer.len()
                )));
            }
            buffer.drain(0..n);
            Ok(())
        }
    }
}
