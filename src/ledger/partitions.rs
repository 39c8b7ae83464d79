/// Key layout for the ledger partitions
///
/// Partition structure:
/// - `jobs`: job:{job_id} -> Job (JSON)
/// - `records`: {job_id}/{contract}:{token_id} -> MigrationRecord (JSON)
/// - `token_index`: {contract}:{token_id}/{job_id} -> empty
/// - `logs`: log:{job_id}:{seq:016} -> LogEntry (JSON)
/// - `metadata`: meta:{key} -> value
use uuid::Uuid;

pub const META_NEXT_LOG_SEQ: &str = "next_log_seq";

/// Encode a job key: job:{job_id}
pub fn encode_job_key(job_id: Uuid) -> Vec<u8> {
    format!("job:{}", job_id).into_bytes()
}

/// Encode a record key: {job_id}/{contract}:{token_id}
pub fn encode_record_key(job_id: Uuid, contract: &str, token_id: &str) -> Vec<u8> {
    format!("{}/{}:{}", job_id, contract, token_id).into_bytes()
}

/// Prefix of every record in a job: {job_id}/
pub fn encode_record_prefix(job_id: Uuid) -> Vec<u8> {
    format!("{}/", job_id).into_bytes()
}

/// Encode a token index key: {contract}:{token_id}/{job_id}
pub fn encode_token_index_key(contract: &str, token_id: &str, job_id: Uuid) -> Vec<u8> {
    format!("{}:{}/{}", contract, token_id, job_id).into_bytes()
}

pub fn encode_token_index_prefix(contract: &str, token_id: &str) -> Vec<u8> {
    format!("{}:{}/", contract, token_id).into_bytes()
}

/// Job id from a token index key
pub fn decode_token_index_key(key: &[u8]) -> Option<Uuid> {
    let key_str = std::str::from_utf8(key).ok()?;
    let (_, job_id) = key_str.rsplit_once('/')?;
    Uuid::parse_str(job_id).ok()
}

/// Encode a log key: log:{job_id}:{seq:016}
pub fn encode_log_key(job_id: Uuid, seq: u64) -> Vec<u8> {
    format!("log:{}:{:016}", job_id, seq).into_bytes()
}

/// Encode a log prefix for range scan: log:{job_id}:
pub fn encode_log_prefix(job_id: Uuid) -> Vec<u8> {
    format!("log:{}:", job_id).into_bytes()
}

/// Encode a metadata key: meta:{key}
pub fn encode_meta_key(key: &str) -> Vec<u8> {
    format!("meta:{}", key).into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_keys_share_job_prefix() {
        let job_id = Uuid::now_v7();
        let key = encode_record_key(job_id, "sei1c", "7");
        assert!(key.starts_with(&encode_record_prefix(job_id)));
        assert_eq!(key, format!("{}/sei1c:7", job_id).into_bytes());
    }

    #[test]
    fn test_token_index_round_trip() {
        let job_id = Uuid::now_v7();
        let key = encode_token_index_key("sei1c", "7", job_id);

        assert!(key.starts_with(&encode_token_index_prefix("sei1c", "7")));
        assert!(!key.starts_with(&encode_token_index_prefix("sei1c", "70")));
        assert_eq!(decode_token_index_key(&key), Some(job_id));
        assert_eq!(decode_token_index_key(b"sei1c:7/not-a-uuid"), None);
    }

    #[test]
    fn test_log_keys_sort_by_sequence() {
        let job_id = Uuid::now_v7();
        let early = encode_log_key(job_id, 9);
        let late = encode_log_key(job_id, 10);

        assert!(early < late);
        assert!(early.starts_with(&encode_log_prefix(job_id)));
    }

    #[test]
    fn test_meta_key_encoding() {
        assert_eq!(encode_meta_key(META_NEXT_LOG_SEQ), b"meta:next_log_seq");
    }
}
