use crate::error::Error;

/// Column values of one `block` row, ready to bind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRow {
    pub hash: Vec<u8>,
    pub height: i64,
    pub timestamp: i64,
    pub n_bits: i64,
    pub miner_address: Vec<u8>,
    pub extra_data: Option<Vec<u8>>,
    pub tx_count: i64,
    pub tx_value: i64,
    pub tx_fees: i64,
    pub size: i64,
}

/// Column values of one `transaction` row, minus the owning block id which is only known once the
/// block row has been inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRow {
    pub hash: Vec<u8>,
    pub sender_type: i64,
    pub sender_address: Vec<u8>,
    pub recipient_type: i64,
    pub recipient_address: Vec<u8>,
    pub value: i64,
    pub fee: i64,
    pub validity_start_height: i64,
    pub flags: i64,
    pub data: Option<Vec<u8>>,
}

pub fn to_i64(field: &'static str, value: u64) -> Result<i64, Error> {
    i64::try_from(value).map_err(|_| Error::OutOfRange { field, value })
}

pub fn from_i64(field: &'static str, value: i64) -> Result<u64, Error> {
    u64::try_from(value).map_err(|_| Error::custom(format!("stored {field} is negative: {value}")))
}

/// Empty payloads are stored as NULL.
pub fn nullable(bytes: &[u8]) -> Option<Vec<u8>> {
    (!bytes.is_empty()).then(|| bytes.to_vec())
}
