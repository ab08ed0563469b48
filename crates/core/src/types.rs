use serde::{Deserialize, Serialize};

/// Lamports per SOL (smallest chain unit)
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Convert a decimal SOL amount to lamports.
///
/// Returns `None` for non-finite, non-positive, or out-of-range inputs.
/// Rounds to the nearest lamport; all arithmetic below this boundary
/// is integer lamports.
pub fn sol_to_lamports(sol: f64) -> Option<u64> {
    if !sol.is_finite() || sol <= 0.0 {
        return None;
    }
    let lamports = (sol * LAMPORTS_PER_SOL as f64).round();
    if lamports < 1.0 || lamports > u64::MAX as f64 {
        return None;
    }
    Some(lamports as u64)
}

/// Convert lamports to decimal SOL (display only)
pub fn lamports_to_sol(lamports: u64) -> f64 {
    lamports as f64 / LAMPORTS_PER_SOL as f64
}

/// Subscription tier for creator subscriptions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubscriptionTier {
    /// Entry tier
    Basic,
    /// Mid tier
    Standard,
    /// Top tier
    Premium,
}

impl SubscriptionTier {
    /// Get display name for the tier
    pub fn display_name(&self) -> &'static str {
        match self {
            SubscriptionTier::Basic => "Basic",
            SubscriptionTier::Standard => "Standard",
            SubscriptionTier::Premium => "Premium",
        }
    }
}

/// Category of payment purpose
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PurposeKind {
    /// Monthly creator subscription
    Subscription,
    /// One-time paid post unlock
    PostPurchase,
    /// Per-message unlock in paid DMs
    MessageUnlock,
    /// Direct tip to a creator
    Tip,
}

impl PurposeKind {
    /// Short code used in logs and ledger rows
    pub fn as_str(&self) -> &'static str {
        match self {
            PurposeKind::Subscription => "subscription",
            PurposeKind::PostPurchase => "post-purchase",
            PurposeKind::MessageUnlock => "message-unlock",
            PurposeKind::Tip => "tip",
        }
    }
}

/// What a payment is for.
///
/// Identifiers are opaque strings owned by the surrounding application
/// (creator ids, post ids, message ids).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentPurpose {
    /// Subscribe to a creator at a given tier
    Subscription {
        creator: String,
        tier: SubscriptionTier,
    },
    /// Unlock a single paid post
    PostPurchase { post: String },
    /// Unlock a single paid message
    MessageUnlock { message: String },
    /// Tip a creator an arbitrary amount (chosen by the payer)
    Tip { creator: String, lamports: u64 },
}

impl PaymentPurpose {
    /// The purpose category
    pub fn kind(&self) -> PurposeKind {
        match self {
            PaymentPurpose::Subscription { .. } => PurposeKind::Subscription,
            PaymentPurpose::PostPurchase { .. } => PurposeKind::PostPurchase,
            PaymentPurpose::MessageUnlock { .. } => PurposeKind::MessageUnlock,
            PaymentPurpose::Tip { .. } => PurposeKind::Tip,
        }
    }

    /// Whether a payer may validly settle this purpose more than once.
    ///
    /// Tips are inherently repeatable and message unlocks are priced
    /// per-message; subscriptions and post purchases are one valid
    /// settlement per payer.
    pub fn allows_repeat(&self) -> bool {
        matches!(
            self,
            PaymentPurpose::Tip { .. } | PaymentPurpose::MessageUnlock { .. }
        )
    }

    /// The identifier the one-valid-settlement rule is keyed on.
    ///
    /// Subscription tiers share one key per creator: the tier label is a
    /// pricing detail, not a separate product.
    pub fn dedup_id(&self) -> &str {
        match self {
            PaymentPurpose::Subscription { creator, .. } => creator,
            PaymentPurpose::PostPurchase { post } => post,
            PaymentPurpose::MessageUnlock { message } => message,
            PaymentPurpose::Tip { creator, .. } => creator,
        }
    }
}

impl std::fmt::Display for PaymentPurpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind().as_str(), self.dedup_id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sol_to_lamports() {
        assert_eq!(sol_to_lamports(1.0), Some(LAMPORTS_PER_SOL));
        assert_eq!(sol_to_lamports(0.15), Some(150_000_000));
        assert_eq!(sol_to_lamports(0.000000001), Some(1));
    }

    #[test]
    fn test_sol_to_lamports_rejects_bad_input() {
        assert_eq!(sol_to_lamports(0.0), None);
        assert_eq!(sol_to_lamports(-1.0), None);
        assert_eq!(sol_to_lamports(f64::NAN), None);
        assert_eq!(sol_to_lamports(f64::INFINITY), None);
        // Below half a lamport rounds to zero
        assert_eq!(sol_to_lamports(0.0000000001), None);
    }

    #[test]
    fn test_lamports_to_sol() {
        assert_eq!(lamports_to_sol(LAMPORTS_PER_SOL), 1.0);
        assert_eq!(lamports_to_sol(150_000_000), 0.15);
    }

    #[test]
    fn test_purpose_kind() {
        let sub = PaymentPurpose::Subscription {
            creator: "creator-1".into(),
            tier: SubscriptionTier::Standard,
        };
        assert_eq!(sub.kind(), PurposeKind::Subscription);
        assert_eq!(sub.kind().as_str(), "subscription");
        assert_eq!(sub.dedup_id(), "creator-1");
    }

    #[test]
    fn test_allows_repeat() {
        let tip = PaymentPurpose::Tip {
            creator: "creator-1".into(),
            lamports: 1_000_000,
        };
        let unlock = PaymentPurpose::MessageUnlock {
            message: "msg-9".into(),
        };
        let sub = PaymentPurpose::Subscription {
            creator: "creator-1".into(),
            tier: SubscriptionTier::Basic,
        };
        let post = PaymentPurpose::PostPurchase { post: "post-3".into() };

        assert!(tip.allows_repeat());
        assert!(unlock.allows_repeat());
        assert!(!sub.allows_repeat());
        assert!(!post.allows_repeat());
    }

    #[test]
    fn test_subscription_dedup_ignores_tier() {
        let basic = PaymentPurpose::Subscription {
            creator: "creator-1".into(),
            tier: SubscriptionTier::Basic,
        };
        let premium = PaymentPurpose::Subscription {
            creator: "creator-1".into(),
            tier: SubscriptionTier::Premium,
        };
        assert_eq!(basic.dedup_id(), premium.dedup_id());
    }

    #[test]
    fn test_purpose_display() {
        let purpose = PaymentPurpose::PostPurchase { post: "post-42".into() };
        assert_eq!(purpose.to_string(), "post-purchase:post-42");
    }

    #[test]
    fn test_tier_display_name() {
        assert_eq!(SubscriptionTier::Basic.display_name(), "Basic");
        assert_eq!(SubscriptionTier::Standard.display_name(), "Standard");
        assert_eq!(SubscriptionTier::Premium.display_name(), "Premium");
    }
}
