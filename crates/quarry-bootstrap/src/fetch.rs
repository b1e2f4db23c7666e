//! Chunk validation for the fetch protocol.
//!
//! Every chunk the remote returns is checked before its bytes reach a
//! sink: the offset must be exactly the one requested, the CRC32C must
//! match the payload, and the chunk must not claim bytes past the end of
//! the item. A corrupt or reordered reply aborts the transfer.

use quarry_core::{Error, Result};
use quarry_proto::bootstrap as pb;

/// Validate a chunk received in response to a fetch at `expected_offset`.
pub(crate) fn verify_chunk(expected_offset: u64, chunk: &pb::DataChunk) -> Result<()> {
    if chunk.offset != expected_offset {
        return Err(Error::InvalidArgument(format!(
            "Offset did not match what was asked for: {expected_offset} vs {}",
            chunk.offset
        )));
    }

    let crc32 = crc32c::crc32c(&chunk.data);
    if crc32 != chunk.crc32c {
        return Err(Error::Corruption(format!(
            "CRC32 does not match at offset {expected_offset} size {}: {crc32} vs {}",
            chunk.data.len(),
            chunk.crc32c
        )));
    }

    if chunk.offset + chunk.data.len() as u64 > chunk.total_data_length {
        return Err(Error::InvalidArgument(format!(
            "Chunk at offset {} with length {} overruns total data length {}",
            chunk.offset,
            chunk.data.len(),
            chunk.total_data_length
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(offset: u64, data: &[u8], total: u64) -> pb::DataChunk {
        pb::DataChunk {
            offset,
            data: data.to_vec(),
            crc32c: crc32c::crc32c(data),
            total_data_length: total,
        }
    }

    #[test]
    fn test_valid_chunk() {
        verify_chunk(0, &chunk(0, b"abcdef", 6)).unwrap();
        verify_chunk(6, &chunk(6, b"ghij", 10)).unwrap();
    }

    #[test]
    fn test_empty_item() {
        verify_chunk(0, &chunk(0, b"", 0)).unwrap();
    }

    #[test]
    fn test_offset_mismatch() {
        let err = verify_chunk(1024, &chunk(2048, b"data", 65536)).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(err.to_string().contains("1024 vs 2048"), "{err}");
    }

    #[test]
    fn test_crc_mismatch_mentions_offset_and_both_values() {
        let mut bad = chunk(512, b"payload", 4096);
        let claimed = bad.crc32c.wrapping_add(1);
        bad.crc32c = claimed;
        let computed = crc32c::crc32c(b"payload");

        let err = verify_chunk(512, &bad).unwrap_err();
        assert!(matches!(err, Error::Corruption(_)));
        let msg = err.to_string();
        assert!(msg.contains("offset 512"), "{msg}");
        assert!(msg.contains(&computed.to_string()), "{msg}");
        assert!(msg.contains(&claimed.to_string()), "{msg}");
    }

    #[test]
    fn test_overrun_rejected() {
        let err = verify_chunk(4, &chunk(4, b"xyz", 5)).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
