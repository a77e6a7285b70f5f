//! Status vocabularies shared by every handler.
//!
//! Two rule sets live here and nowhere else:
//! - the comment status table translating between the canonical tokens this
//!   backend exposes and the tokens the content source expects
//! - the order status predicates (abandoned carts, revenue, purchase history)

use serde::{Deserialize, Serialize};

/// Canonical comment status bucket.
///
/// Every comment is in exactly one bucket. The content source accepts
/// `approve` on writes and filters but reports `approved` on reads, so both
/// directions go through [`CommentStatus::to_source_token`] and
/// [`CommentStatus::from_source_token`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentStatus {
    Approved,
    Hold,
    Spam,
    Trash,
}

/// Content source token per bucket. Only `approved` differs.
const SOURCE_TOKENS: [(CommentStatus, &str); 4] = [
    (CommentStatus::Approved, "approve"),
    (CommentStatus::Hold, "hold"),
    (CommentStatus::Spam, "spam"),
    (CommentStatus::Trash, "trash"),
];

impl CommentStatus {
    /// All buckets, in the order counts and listings are assembled.
    pub const ALL: [Self; 4] = [Self::Approved, Self::Hold, Self::Spam, Self::Trash];

    /// The canonical token exposed to API clients.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Hold => "hold",
            Self::Spam => "spam",
            Self::Trash => "trash",
        }
    }

    /// The token the content source expects on writes and filters.
    #[must_use]
    pub fn to_source_token(self) -> &'static str {
        SOURCE_TOKENS
            .iter()
            .find(|(status, _)| *status == self)
            .map_or(self.as_str(), |(_, source)| *source)
    }

    /// Parse either vocabulary (`approve`, `approved`, `hold`, ...).
    #[must_use]
    pub fn from_source_token(token: &str) -> Option<Self> {
        let token = token.trim();
        SOURCE_TOKENS
            .iter()
            .find(|(status, source)| {
                token.eq_ignore_ascii_case(status.as_str()) || token.eq_ignore_ascii_case(source)
            })
            .map(|(status, _)| *status)
    }

    /// Translate any client-supplied status token for an outbound request.
    ///
    /// Unknown tokens are forwarded verbatim.
    #[must_use]
    pub fn outbound_token(token: &str) -> String {
        Self::from_source_token(token)
            .map_or_else(|| token.to_owned(), |status| status.to_source_token().to_owned())
    }

    /// Translate a status token received from the content source.
    ///
    /// Unknown tokens are passed through unchanged.
    #[must_use]
    pub fn inbound_token(token: &str) -> String {
        Self::from_source_token(token)
            .map_or_else(|| token.to_owned(), |status| status.as_str().to_owned())
    }
}

impl std::fmt::Display for CommentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CommentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_source_token(s).ok_or_else(|| format!("invalid comment status: {s}"))
    }
}

/// Order status predicates.
pub mod order_status {
    /// Status of an order that never left checkout.
    pub const CHECKOUT_DRAFT: &str = "checkout-draft";

    /// Abandoned carts are excluded from every order listing and statistic.
    #[must_use]
    pub fn is_abandoned_cart(status: &str) -> bool {
        status == CHECKOUT_DRAFT
    }

    /// Only completed and processing orders count as revenue.
    #[must_use]
    pub fn counts_toward_revenue(status: &str) -> bool {
        matches!(status, "completed" | "processing")
    }

    /// Orders that count in a customer's purchase history.
    #[must_use]
    pub fn counts_toward_history(status: &str) -> bool {
        !matches!(status, CHECKOUT_DRAFT | "failed" | "cancelled")
    }
}

#[cfg(test)]
mod tests {
    use super::order_status::*;
    use super::*;

    #[test]
    fn test_source_token_round_trip() {
        for status in CommentStatus::ALL {
            assert_eq!(
                CommentStatus::from_source_token(status.to_source_token()),
                Some(status)
            );
            assert_eq!(CommentStatus::from_source_token(status.as_str()), Some(status));
        }
        assert_eq!(CommentStatus::Approved.to_source_token(), "approve");
        assert_eq!(CommentStatus::Hold.to_source_token(), "hold");
    }

    #[test]
    fn test_outbound_and_inbound_tokens() {
        assert_eq!(CommentStatus::outbound_token("approved"), "approve");
        assert_eq!(CommentStatus::outbound_token("spam"), "spam");
        assert_eq!(CommentStatus::outbound_token("unapproved"), "unapproved");
        assert_eq!(CommentStatus::inbound_token("approve"), "approved");
        assert_eq!(CommentStatus::inbound_token("approved"), "approved");
        assert_eq!(CommentStatus::inbound_token("1"), "1");
    }

    #[test]
    fn test_from_str() {
        assert_eq!("Trash".parse::<CommentStatus>(), Ok(CommentStatus::Trash));
        assert!("all".parse::<CommentStatus>().is_err());
    }

    #[test]
    fn test_order_predicates() {
        assert!(is_abandoned_cart("checkout-draft"));
        assert!(!is_abandoned_cart("pending"));

        assert!(counts_toward_revenue("completed"));
        assert!(counts_toward_revenue("processing"));
        assert!(!counts_toward_revenue("pending"));
        assert!(!counts_toward_revenue("checkout-draft"));

        assert!(counts_toward_history("pending"));
        assert!(!counts_toward_history("failed"));
        assert!(!counts_toward_history("cancelled"));
        assert!(!counts_toward_history("checkout-draft"));
    }
}
