use rand::distributions::Alphanumeric;
use rand::Rng;

/// length of generated share and upload ids (8 symbols of base62 ≈ 47.6 bits)
pub const ID_LENGTH: usize = 8;

/// generate a short random id drawn uniformly from [0-9A-Za-z]
pub fn generate_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(ID_LENGTH)
        .map(char::from)
        .collect()
}

/// ids index directly into the data directory, so only accept what generate_id can produce
pub fn is_valid_id(id: &str) -> bool {
    id.len() == ID_LENGTH && id.bytes().all(|b| b.is_ascii_alphanumeric())
}
