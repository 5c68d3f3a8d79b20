use serde::{Deserialize, Serialize};

/// `Amount`, a minor-units currency amount.
pub mod amount;
/// Chat messages and message requests.
pub mod chat;
/// Practice exams, questions, results, leaderboards.
pub mod exam;
/// Support tickets, replies, attachments.
pub mod ticket;
/// `TimestampMs` and time helpers.
pub mod time;
/// User ids and profiles.
pub mod user;
/// Wallet balance, KYC status, transactions.
pub mod wallet;

/// A struct denoting an empty API request or response.
///
/// This type should serialize/deserialize in such a way that we have room to
/// add optional fields in the future without causing old clients to reject
/// the message (backwards-compatible changes).
///
/// Always prefer this type over `()` (unit) to avoid API upgrade hazards. In
/// JSON, unit will only deserialize from `"null"`, meaning we can't add new
/// optional fields without breaking old clients.
#[derive(Serialize, Deserialize, Debug, PartialEq)]
pub struct Empty {}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_serde() {
        // query string
        assert_eq!("", serde_urlencoded::to_string(&Empty {}).unwrap());
        assert_eq!(Empty {}, serde_urlencoded::from_str::<Empty>("").unwrap());
        assert_eq!(
            Empty {},
            serde_urlencoded::from_str::<Empty>("foo=123").unwrap(),
        );

        // json
        assert_eq!("{}", serde_json::to_string(&Empty {}).unwrap());
        // empty string is not valid json
        serde_json::from_str::<Empty>("").unwrap_err();
        assert_eq!(Empty {}, serde_json::from_str::<Empty>("{}").unwrap());
        assert_eq!(
            Empty {},
            serde_json::from_str::<Empty>(r#"{"foo":123}"#).unwrap(),
        );
    }
}
