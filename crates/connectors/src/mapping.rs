//! Wire → domain mapping for the Flexcube banking core.
//!
//! The core's responses come through with inconsistent field naming
//! depending on which module served the call (`CUST_NO` vs `CustomerNo`).
//! Extraction tolerates either convention per field and fills documented
//! defaults where the wire payload omits a value.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DEFAULT_CURRENCY: &str = "INR";
pub const DEFAULT_KYC_STATUS: &str = "PENDING";
pub const DEFAULT_RISK_CATEGORY: &str = "MEDIUM";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlexcubeCustomer {
    pub customer_no: String,
    pub full_name: String,
    pub category: String,
    pub branch_code: String,
    pub kyc_status: String,
    pub risk_category: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pan: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mobile: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountBalance {
    pub book_balance: f64,
    pub available_balance: f64,
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlexcubeAccount {
    pub account_no: String,
    pub customer_no: String,
    pub account_class: String,
    pub branch_code: String,
    pub status: String,
    pub balance: AccountBalance,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlexcubeTransaction {
    pub reference_no: String,
    pub account_no: String,
    pub amount: f64,
    pub currency: String,
    pub dr_cr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub narrative: Option<String>,
}

pub fn map_customer(wire: &Value) -> FlexcubeCustomer {
    FlexcubeCustomer {
        customer_no: text(wire, &["CUST_NO", "CustomerNo", "customerNo"]).unwrap_or_default(),
        full_name: text(wire, &["CUST_NAME", "CustomerName", "FullName", "fullName"])
            .unwrap_or_default(),
        category: text(wire, &["CUST_CATEGORY", "Category", "category"])
            .unwrap_or_else(|| "INDIVIDUAL".to_string()),
        branch_code: text(wire, &["BRANCH_CODE", "BranchCode", "branchCode"]).unwrap_or_default(),
        kyc_status: text(wire, &["KYC_STATUS", "KycStatus", "kycStatus"])
            .unwrap_or_else(|| DEFAULT_KYC_STATUS.to_string()),
        risk_category: text(wire, &["RISK_CATEGORY", "RiskCategory", "riskCategory"])
            .unwrap_or_else(|| DEFAULT_RISK_CATEGORY.to_string()),
        pan: text(wire, &["PAN_NO", "PanNo", "pan"]),
        mobile: text(wire, &["MOBILE_NO", "MobileNo", "mobile"]),
        email: text(wire, &["EMAIL_ID", "Email", "email"]),
    }
}

pub fn map_account(wire: &Value) -> FlexcubeAccount {
    let currency = text(wire, &["CCY", "Currency", "currency"])
        .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());
    FlexcubeAccount {
        account_no: text(wire, &["ACC_NO", "AccountNo", "accountNo", "AccountNumber"])
            .unwrap_or_default(),
        customer_no: text(wire, &["CUST_NO", "CustomerNo", "customerNo"]).unwrap_or_default(),
        account_class: text(wire, &["ACC_CLASS", "AccountClass", "accountClass"])
            .unwrap_or_else(|| "SAVINGS".to_string()),
        branch_code: text(wire, &["BRANCH_CODE", "BranchCode", "branchCode"]).unwrap_or_default(),
        status: text(wire, &["ACC_STATUS", "Status", "status"])
            .unwrap_or_else(|| "ACTIVE".to_string()),
        balance: AccountBalance {
            book_balance: number(wire, &["BOOK_BAL", "BookBalance", "bookBalance"]).unwrap_or(0.0),
            available_balance: number(wire, &["AVL_BAL", "AvailableBalance", "availableBalance"])
                .unwrap_or(0.0),
            currency,
        },
    }
}

pub fn map_transaction(wire: &Value) -> FlexcubeTransaction {
    FlexcubeTransaction {
        reference_no: text(wire, &["TXN_REF", "ReferenceNo", "referenceNo"]).unwrap_or_default(),
        account_no: text(wire, &["ACC_NO", "AccountNo", "accountNo"]).unwrap_or_default(),
        amount: number(wire, &["TXN_AMT", "Amount", "amount"]).unwrap_or(0.0),
        currency: text(wire, &["CCY", "Currency", "currency"])
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string()),
        dr_cr: text(wire, &["DR_CR", "DrCr", "drCr"]).unwrap_or_else(|| "D".to_string()),
        value_date: text(wire, &["VALUE_DATE", "ValueDate", "valueDate"]),
        narrative: text(wire, &["NARRATIVE", "Narrative", "narrative"]),
    }
}

fn field<'a>(wire: &'a Value, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .find_map(|name| wire.get(name))
        .filter(|v| !v.is_null())
}

fn text(wire: &Value, names: &[&str]) -> Option<String> {
    field(wire, names).map(|v| match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    })
}

fn number(wire: &Value, names: &[&str]) -> Option<f64> {
    field(wire, names).and_then(|v| match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn account_mapping_parses_string_balances() {
        // The SOAP body parser leaves every leaf as a string.
        let wire = json!({
            "ACC_NO": "0012345",
            "CUST_NO": "C-9",
            "BOOK_BAL": "15000.50",
            "AVL_BAL": "14200.00",
            "CCY": "INR"
        });
        let account = map_account(&wire);
        assert_eq!(account.account_no, "0012345");
        assert_eq!(account.balance.book_balance, 15000.50);
        assert_eq!(account.balance.available_balance, 14200.00);

        let value = serde_json::to_value(&account).unwrap();
        assert!(value["balance"]["bookBalance"].is_number());
    }

    #[test]
    fn account_mapping_tolerates_alternate_naming() {
        let wire = json!({
            "AccountNo": "77",
            "CustomerNo": "C-1",
            "BookBalance": 100.0
        });
        let account = map_account(&wire);
        assert_eq!(account.account_no, "77");
        assert_eq!(account.customer_no, "C-1");
        assert_eq!(account.balance.book_balance, 100.0);
    }

    #[test]
    fn account_defaults_fill_missing_fields() {
        let account = map_account(&json!({ "ACC_NO": "1" }));
        assert_eq!(account.balance.currency, DEFAULT_CURRENCY);
        assert_eq!(account.status, "ACTIVE");
        assert_eq!(account.balance.book_balance, 0.0);
    }

    #[test]
    fn customer_defaults_for_kyc_and_risk() {
        let customer = map_customer(&json!({
            "CUST_NO": "C-42",
            "CustomerName": "Asha Rao"
        }));
        assert_eq!(customer.customer_no, "C-42");
        assert_eq!(customer.full_name, "Asha Rao");
        assert_eq!(customer.kyc_status, DEFAULT_KYC_STATUS);
        assert_eq!(customer.risk_category, DEFAULT_RISK_CATEGORY);
        assert!(customer.pan.is_none());
    }

    #[test]
    fn transaction_mapping() {
        let txn = map_transaction(&json!({
            "TXN_REF": "T-1001",
            "ACC_NO": "0012345",
            "TXN_AMT": "2500.00",
            "DR_CR": "C",
            "NARRATIVE": "NEFT inward"
        }));
        assert_eq!(txn.reference_no, "T-1001");
        assert_eq!(txn.amount, 2500.0);
        assert_eq!(txn.dr_cr, "C");
        assert_eq!(txn.currency, DEFAULT_CURRENCY);
        assert_eq!(txn.narrative.as_deref(), Some("NEFT inward"));
    }
}
