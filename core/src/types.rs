//! Shared primitive types and canonical column names.

/// A stable customer identifier as it appears in the input table.
pub type CustomerId = String;

/// Zero-based index of a row in the input table.
pub type RowIx = usize;

/// The canonical run identifier.
pub type RunId = String;

pub const COL_CUSTOMER_ID: &str = "Customer_ID";
pub const COL_TRANSACTION_AMOUNT: &str = "Transaction_Amount";
pub const COL_REPORTED_AMOUNT: &str = "Reported_Amount";
pub const COL_ACCOUNT_BALANCE: &str = "Account_Balance";
pub const COL_COUNTRY: &str = "Country";

pub const COL_RISK_SCORE: &str = "Risk_Score";
pub const COL_RISK_SCORE_ADJUSTED: &str = "Risk_Score_Adjusted";
pub const COL_ANOMALY_SCORE: &str = "anomaly_score";

pub const COL_REASON: &str = "Reason";
pub const COL_ACTION: &str = "Action";

/// Columns every input table must carry. A table missing any of these
/// is schema-corrupt and rejected outright.
pub const REQUIRED_COLUMNS: &[&str] = &[
    COL_CUSTOMER_ID,
    COL_TRANSACTION_AMOUNT,
    COL_REPORTED_AMOUNT,
    COL_ACCOUNT_BALANCE,
    COL_COUNTRY,
];
