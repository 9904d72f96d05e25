//! ChecksumCodec: the keyed digests each gateway signs its payloads with.
//!
//! Every function here is pure. Callers supply the canonical fields and the
//! date; nothing reads configuration or the clock directly.

use crate::payments::error::{ChecksumKind, PaymentError, PaymentResult};
use crate::payments::utils::secure_eq;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use std::str::FromStr;

pub const PAYU_UDF_COUNT: usize = 10;

pub fn sha256_hex(input: &str) -> String {
    hex::encode(Sha256::digest(input.as_bytes()))
}

pub fn sha512_hex(input: &str) -> String {
    hex::encode(Sha512::digest(input.as_bytes()))
}

// ============================================================================
// PayU pipe hash
// ============================================================================

/// Fields PayU signs in both directions.
#[derive(Debug, Clone, Default)]
pub struct PayuHashFields<'a> {
    pub key: &'a str,
    pub txnid: &'a str,
    pub amount: &'a str,
    pub productinfo: &'a str,
    pub firstname: &'a str,
    pub email: &'a str,
    /// udf1..udf10, empty string when absent.
    pub udf: [&'a str; PAYU_UDF_COUNT],
}

/// `key|txnid|amount|productinfo|firstname|email|udf1|..|udf10|salt`
pub fn payu_request_hash_input(fields: &PayuHashFields<'_>, salt: &str) -> String {
    let mut parts: Vec<&str> = vec![
        fields.key,
        fields.txnid,
        fields.amount,
        fields.productinfo,
        fields.firstname,
        fields.email,
    ];
    parts.extend_from_slice(&fields.udf);
    parts.push(salt);
    parts.join("|")
}

pub fn payu_request_hash(fields: &PayuHashFields<'_>, salt: &str) -> String {
    sha512_hex(&payu_request_hash_input(fields, salt))
}

/// Mirror of the request order with the status after the salt:
/// `[additional_charges|]salt|status|udf10|..|udf1|email|firstname|productinfo|amount|txnid|key`
pub fn payu_response_hash_input(
    fields: &PayuHashFields<'_>,
    status: &str,
    salt: &str,
    additional_charges: Option<&str>,
) -> String {
    let mut parts: Vec<&str> = Vec::with_capacity(PAYU_UDF_COUNT + 9);
    if let Some(charges) = additional_charges.filter(|c| !c.is_empty()) {
        parts.push(charges);
    }
    parts.push(salt);
    parts.push(status);
    parts.extend(fields.udf.iter().rev());
    parts.extend_from_slice(&[
        fields.email,
        fields.firstname,
        fields.productinfo,
        fields.amount,
        fields.txnid,
        fields.key,
    ]);
    parts.join("|")
}

pub fn payu_response_hash(
    fields: &PayuHashFields<'_>,
    status: &str,
    salt: &str,
    additional_charges: Option<&str>,
) -> String {
    sha512_hex(&payu_response_hash_input(
        fields,
        status,
        salt,
        additional_charges,
    ))
}

pub fn verify_payu_response_hash(
    fields: &PayuHashFields<'_>,
    status: &str,
    salt: &str,
    additional_charges: Option<&str>,
    received: &str,
) -> PaymentResult<()> {
    let expected = payu_response_hash(fields, status, salt, additional_charges);
    let received = received.trim().to_ascii_lowercase();
    if secure_eq(expected.as_bytes(), received.as_bytes()) {
        Ok(())
    } else {
        Err(PaymentError::ChecksumMismatch {
            kind: ChecksumKind::ResponseVerification,
        })
    }
}

// ============================================================================
// Sorted-parameter date checksum
// ============================================================================

/// Values concatenated in lexicographic key order, then the date, SHA-256 hex.
pub fn sorted_params_checksum<K, V>(params: &[(K, V)], date: &str) -> String
where
    K: AsRef<str>,
    V: AsRef<str>,
{
    let mut sorted: Vec<(&str, &str)> = params
        .iter()
        .map(|(k, v)| (k.as_ref(), v.as_ref()))
        .collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    let mut data: String = sorted.into_iter().map(|(_, v)| v).collect();
    data.push_str(date);
    sha256_hex(&data)
}

// ============================================================================
// Airpay legacy alldata checksum
// ============================================================================

/// Checksum formulas Airpay has used for payment requests.
///
/// The v3 integration shipped two incompatible field orders; neither is
/// inferred from the data. Operators pick one explicitly.
///
/// The default follows the v4 client and differs from the v3 merchant
/// checkout, which signs with the alldata orders: with-address when the
/// buyer's address fields are present, without-address otherwise.
/// Deployments moving over from that checkout must set
/// `AIRPAY_CHECKSUM_FORMULA=alldata_with_address` (or
/// `alldata_without_address`) to keep producing the same checksums.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AirpayChecksumFormula {
    /// v4: sorted payload values + date.
    #[default]
    SortedParams,
    /// v3: `key_sha256@email first last address city state country amount orderid date`.
    AllDataWithAddress,
    /// v3: `key_sha256@email first last amount orderid date`.
    AllDataWithoutAddress,
}

impl AirpayChecksumFormula {
    pub fn as_str(&self) -> &'static str {
        match self {
            AirpayChecksumFormula::SortedParams => "sorted_params",
            AirpayChecksumFormula::AllDataWithAddress => "alldata_with_address",
            AirpayChecksumFormula::AllDataWithoutAddress => "alldata_without_address",
        }
    }
}

impl FromStr for AirpayChecksumFormula {
    type Err = PaymentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "sorted_params" | "v4" => Ok(AirpayChecksumFormula::SortedParams),
            "alldata_with_address" => Ok(AirpayChecksumFormula::AllDataWithAddress),
            "alldata_without_address" => Ok(AirpayChecksumFormula::AllDataWithoutAddress),
            _ => Err(PaymentError::validation(
                format!("unknown airpay checksum formula: {}", value),
                "AIRPAY_CHECKSUM_FORMULA",
            )),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AirpayAllData<'a> {
    pub email: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
    pub address: &'a str,
    pub city: &'a str,
    pub state: &'a str,
    pub country: &'a str,
    pub amount: &'a str,
    pub order_id: &'a str,
}

/// `sha256(username~:~password)`, the salt of the alldata checksum.
pub fn airpay_key_sha256(username: &str, password: &str) -> String {
    sha256_hex(&format!("{}~:~{}", username, password))
}

/// `sha256(secret@username:|:password)`
pub fn airpay_private_key(secret: &str, username: &str, password: &str) -> String {
    sha256_hex(&format!("{}@{}:|:{}", secret, username, password))
}

pub fn airpay_alldata_checksum(
    data: &AirpayAllData<'_>,
    with_address: bool,
    key_sha256: &str,
    date: &str,
) -> String {
    let alldata = if with_address {
        [
            data.email,
            data.first_name,
            data.last_name,
            data.address,
            data.city,
            data.state,
            data.country,
            data.amount,
            data.order_id,
        ]
        .concat()
    } else {
        [
            data.email,
            data.first_name,
            data.last_name,
            data.amount,
            data.order_id,
        ]
        .concat()
    };
    sha256_hex(&format!("{}@{}{}", key_sha256, alldata, date))
}

// ============================================================================
// Airpay callback CRC32
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct AirpayCallbackHashFields<'a> {
    pub order_id: &'a str,
    pub ap_transaction_id: &'a str,
    pub amount: &'a str,
    pub status: &'a str,
    pub message: &'a str,
    pub merchant_id: &'a str,
    pub username: &'a str,
    pub chmod: &'a str,
    pub customer_vpa: &'a str,
}

pub fn airpay_callback_hash_input(fields: &AirpayCallbackHashFields<'_>) -> String {
    let mut data = [
        fields.order_id,
        fields.ap_transaction_id,
        fields.amount,
        fields.status,
        fields.message,
        fields.merchant_id,
        fields.username,
    ]
    .join(":");
    if fields.chmod.trim().eq_ignore_ascii_case("upi") {
        data.push(':');
        data.push_str(fields.customer_vpa);
    }
    data
}

/// Unsigned decimal rendering of the CRC32 of the callback fields.
pub fn airpay_callback_hash(fields: &AirpayCallbackHashFields<'_>) -> String {
    let mut crc = flate2::Crc::new();
    crc.update(airpay_callback_hash_input(fields).as_bytes());
    crc.sum().to_string()
}

pub fn verify_airpay_callback_hash(
    fields: &AirpayCallbackHashFields<'_>,
    received: &str,
) -> PaymentResult<()> {
    let expected = airpay_callback_hash(fields);
    if secure_eq(expected.as_bytes(), received.trim().as_bytes()) {
        Ok(())
    } else {
        Err(PaymentError::ChecksumMismatch {
            kind: ChecksumKind::ResponseVerification,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payu_fields() -> PayuHashFields<'static> {
        let mut udf = [""; PAYU_UDF_COUNT];
        udf[0] = "Wheat";
        PayuHashFields {
            key: "gtKFFx",
            txnid: "TXN123",
            amount: "199.00",
            productinfo: "Wheat Flour",
            firstname: "Test",
            email: "test@example.com",
            udf,
        }
    }

    #[test]
    fn payu_request_hash_matches_reference_vector() {
        let fields = payu_fields();
        assert_eq!(
            payu_request_hash_input(&fields, "eCwWELxi"),
            "gtKFFx|TXN123|199.00|Wheat Flour|Test|test@example.com|Wheat||||||||||eCwWELxi"
        );
        assert_eq!(
            payu_request_hash(&fields, "eCwWELxi"),
            "7fb1d3b40abc7b4143402cadf1bc58d60b528e26340625597edaffae0339f33fa9dcc02b35ec17510f66dbbc44ccc8939dcd38f6824444d47337ec548ac9c3ee"
        );
    }

    #[test]
    fn payu_response_hash_mirrors_request_order() {
        let fields = payu_fields();
        assert_eq!(
            payu_response_hash_input(&fields, "success", "eCwWELxi", None),
            "eCwWELxi|success||||||||||Wheat|test@example.com|Test|Wheat Flour|199.00|TXN123|gtKFFx"
        );
        assert_eq!(
            payu_response_hash(&fields, "success", "eCwWELxi", None),
            "60a18c15e9a0c267ed932207f48fe0a64143477c2016a06dcd3e2bddeeb72700004e26d64e85a4ec419c077edd2884e0bdded71fbf38f2b0449e1465a04de09b"
        );
    }

    #[test]
    fn payu_response_hash_prefixes_additional_charges() {
        let fields = payu_fields();
        assert_eq!(
            payu_response_hash(&fields, "success", "eCwWELxi", Some("1.50")),
            "a0ed78a0ee17f2a83d6e5e8b919a216b1f50c02194e1d0d363e3c8ccc1b5107756fd14596648a136abbb6a67be390550a006d0d9394615c5a6cd9508af702582"
        );
        // Empty charges behave like no charges.
        assert_eq!(
            payu_response_hash(&fields, "success", "eCwWELxi", Some("")),
            payu_response_hash(&fields, "success", "eCwWELxi", None)
        );
    }

    #[test]
    fn payu_verification_accepts_uppercase_and_rejects_altered_fields() {
        let fields = payu_fields();
        let hash = payu_response_hash(&fields, "success", "eCwWELxi", None).to_uppercase();
        assert!(verify_payu_response_hash(&fields, "success", "eCwWELxi", None, &hash).is_ok());

        let mut tampered = payu_fields();
        tampered.amount = "1.00";
        let err = verify_payu_response_hash(&tampered, "success", "eCwWELxi", None, &hash)
            .unwrap_err();
        assert!(matches!(
            err,
            PaymentError::ChecksumMismatch {
                kind: ChecksumKind::ResponseVerification
            }
        ));
    }

    #[test]
    fn sorted_params_checksum_orders_by_key() {
        let params = [("b", "2"), ("a", "1")];
        assert_eq!(
            sorted_params_checksum(&params, "2025-12-26"),
            "72f93acbe876e463427903ecb73155d64f8aae8d833a0b3c3b9880e5a7385ef1"
        );
    }

    #[test]
    fn sorted_params_checksum_changes_with_date() {
        let params = [("a", "1")];
        assert_ne!(
            sorted_params_checksum(&params, "2025-12-26"),
            sorted_params_checksum(&params, "2025-12-27")
        );
    }

    #[test]
    fn airpay_alldata_checksum_without_address_is_stable() {
        let key = airpay_key_sha256("testuser", "testpass");
        assert_eq!(
            key,
            "a85db84eb7f7d09fed976bbb4a493addef1f4fadd5e241b5658e632daa6c0b28"
        );
        let data = AirpayAllData {
            email: "test@example.com",
            first_name: "Test",
            last_name: "User",
            amount: "199.00",
            order_id: "TXN123456789",
            ..Default::default()
        };
        assert_eq!(
            airpay_alldata_checksum(&data, false, &key, "2025-12-26"),
            "dcba33412376eaa1625c1ab028b1a1091b45998ba612b3c6aa1e3b2adf0e4847"
        );
    }

    #[test]
    fn airpay_alldata_checksum_with_address_is_stable() {
        let key = airpay_key_sha256("testuser", "testpass");
        let data = AirpayAllData {
            email: "test@example.com",
            first_name: "Test",
            last_name: "User",
            address: "12 Main St",
            city: "Pune",
            state: "Maharashtra",
            country: "India",
            amount: "199.00",
            order_id: "TXN123456789",
        };
        assert_eq!(
            airpay_alldata_checksum(&data, true, &key, "2025-12-26"),
            "f115c93c35ee9fa075e77bcd78c918ad4c28402290de434a8084882d87f8b1b6"
        );
    }

    #[test]
    fn airpay_private_key_is_stable() {
        assert_eq!(
            airpay_private_key("testsecret", "testuser", "testpass"),
            "7e1c2e4f6af1640e17b6aa9f0e8b330dc46bdf93ddc3ac5835cfaa3dfc133079"
        );
    }

    fn crc_fields(chmod: &'static str) -> AirpayCallbackHashFields<'static> {
        AirpayCallbackHashFields {
            order_id: "TXN123",
            ap_transaction_id: "AP987",
            amount: "199.00",
            status: "200",
            message: "Success",
            merchant_id: "M12345",
            username: "testuser",
            chmod,
            customer_vpa: "buyer@okbank",
        }
    }

    #[test]
    fn airpay_crc_includes_vpa_only_for_upi() {
        let upi = crc_fields("upi");
        assert_eq!(
            airpay_callback_hash_input(&upi),
            "TXN123:AP987:199.00:200:Success:M12345:testuser:buyer@okbank"
        );
        assert_eq!(airpay_callback_hash(&upi), "1256367540");

        let upper = crc_fields(" UPI ");
        assert_eq!(airpay_callback_hash(&upper), "1256367540");
    }

    #[test]
    fn airpay_crc_excludes_vpa_for_other_channels() {
        for chmod in ["", "pg", "nb", "upiqr"] {
            let fields = crc_fields(chmod);
            assert_eq!(
                airpay_callback_hash_input(&fields),
                "TXN123:AP987:199.00:200:Success:M12345:testuser"
            );
            assert_eq!(airpay_callback_hash(&fields), "793912202");
        }
    }

    #[test]
    fn airpay_crc_verification_rejects_hex_rendering() {
        let fields = crc_fields("pg");
        assert!(verify_airpay_callback_hash(&fields, "793912202").is_ok());
        assert!(verify_airpay_callback_hash(&fields, &format!("{:x}", 793912202u32)).is_err());
    }

    #[test]
    fn checksum_formula_parses_names() {
        assert_eq!(
            "alldata_with_address".parse::<AirpayChecksumFormula>().unwrap(),
            AirpayChecksumFormula::AllDataWithAddress
        );
        assert_eq!(
            AirpayChecksumFormula::default().as_str(),
            "sorted_params"
        );
        assert!("md5".parse::<AirpayChecksumFormula>().is_err());
    }
}
