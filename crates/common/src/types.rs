//! # Domain Types
//!
//! Records the engine reads and writes through the store.
//!
//! | Type | Mutated by |
//! |------|-----------|
//! | [`Post`] | engagement recording (counters), earnings processor (earnings) |
//! | [`EngagementEvent`] | created once per (actor, post, kind) |
//! | [`Creator`] | strike ladder (status, probation), admin review (trust score), processor (totals) |
//! | [`EarningRecord`] | created once per credit; later only paid or hold-extended |
//! | [`WarningRecord`] | created by the strike ladder; soft-cleared, never deleted |
//! | [`FlaggedContent`] | at most one unresolved record per (content, reason) |
//!
//! Amounts are `f64` currency units. Persisted amounts go through
//! [`round_amount`] so repeated credits add up exactly.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Post identifier.
pub type PostId = String;

/// User (creator or engaging actor) identifier.
pub type UserId = String;

/// Rounds a currency amount to 6 decimal places.
#[must_use]
pub fn round_amount(amount: f64) -> f64 {
    (amount * 1_000_000.0).round() / 1_000_000.0
}

// ════════════════════════════════════════════════════════════════════════════════
// CONTENT
// ════════════════════════════════════════════════════════════════════════════════

/// Kind of content a post carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContentType {
    Text,
    Article,
    Video,
    ShortVideo,
}

impl ContentType {
    /// Video types measure completion by watch percentage; the others by
    /// scroll depth.
    #[must_use]
    pub fn is_video(&self) -> bool {
        matches!(self, ContentType::Video | ContentType::ShortVideo)
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ContentType::Text => "TEXT",
            ContentType::Article => "ARTICLE",
            ContentType::Video => "VIDEO",
            ContentType::ShortVideo => "SHORT_VIDEO",
        };
        f.write_str(s)
    }
}

/// Length / duration metadata. Only the field relevant to the post's
/// [`ContentType`] is read.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentMetadata {
    /// Character length of a TEXT post.
    #[serde(default)]
    pub char_length: u32,
    /// Word count of an ARTICLE (reading time = words / 200 wpm).
    #[serde(default)]
    pub word_count: u32,
    /// Duration of a VIDEO in seconds.
    #[serde(default)]
    pub duration_secs: u32,
}

/// Aggregate consumption metrics in percent (0–100). Zero means no data.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionMetrics {
    #[serde(default)]
    pub scroll_depth_pct: f64,
    #[serde(default)]
    pub watch_pct: f64,
}

/// A creator's post with its cumulative counters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: PostId,
    pub author_id: UserId,
    pub content_type: ContentType,
    #[serde(default)]
    pub metadata: ContentMetadata,
    #[serde(default)]
    pub consumption: ConsumptionMetrics,
    #[serde(default)]
    pub likes: u64,
    #[serde(default)]
    pub comments: u64,
    #[serde(default)]
    pub shares: u64,
    /// Lifetime earnings credited for this post.
    #[serde(default)]
    pub total_earnings: f64,
    pub created_at: u64,
    /// Timestamp of the most recent engagement, 0 if none.
    #[serde(default)]
    pub last_engaged_at: u64,
}

impl Post {
    /// Creates a post with zeroed counters.
    pub fn new(
        id: impl Into<PostId>,
        author_id: impl Into<UserId>,
        content_type: ContentType,
        created_at: u64,
    ) -> Self {
        Self {
            id: id.into(),
            author_id: author_id.into(),
            content_type,
            metadata: ContentMetadata::default(),
            consumption: ConsumptionMetrics::default(),
            likes: 0,
            comments: 0,
            shares: 0,
            total_earnings: 0.0,
            created_at,
            last_engaged_at: 0,
        }
    }

    /// Counter for a given engagement kind.
    #[must_use]
    pub fn count_of(&self, kind: EngagementKind) -> u64 {
        match kind {
            EngagementKind::Like => self.likes,
            EngagementKind::Comment => self.comments,
            EngagementKind::Share => self.shares,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// ENGAGEMENT
// ════════════════════════════════════════════════════════════════════════════════

/// Engagement types. Each (actor, post, kind) may exist at most once.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngagementKind {
    Like,
    Comment,
    Share,
}

impl EngagementKind {
    pub const ALL: [EngagementKind; 3] = [
        EngagementKind::Like,
        EngagementKind::Comment,
        EngagementKind::Share,
    ];
}

impl fmt::Display for EngagementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EngagementKind::Like => "LIKE",
            EngagementKind::Comment => "COMMENT",
            EngagementKind::Share => "SHARE",
        };
        f.write_str(s)
    }
}

/// A single like, comment or share.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementEvent {
    pub actor_id: UserId,
    pub post_id: PostId,
    pub kind: EngagementKind,
    pub created_at: u64,
    /// Character count of a comment; `None` for likes and shares.
    #[serde(default)]
    pub comment_chars: Option<u32>,
    /// Comment body. Only its length feeds the earnings formula.
    #[serde(default)]
    pub comment_text: Option<String>,
}

impl EngagementEvent {
    /// Deduplication key.
    #[must_use]
    pub fn dedup_key(&self) -> (UserId, PostId, EngagementKind) {
        (self.actor_id.clone(), self.post_id.clone(), self.kind)
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// CREATOR
// ════════════════════════════════════════════════════════════════════════════════

/// Creator tier. Each tier carries a fixed revenue-share fraction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CreatorTier {
    Standard,
    Bronze,
    Silver,
    Gold,
    Genesis,
}

impl CreatorTier {
    /// Revenue-share fraction of this tier.
    #[must_use]
    pub fn revenue_share(&self) -> f64 {
        match self {
            CreatorTier::Standard => 0.55,
            CreatorTier::Bronze => 0.60,
            CreatorTier::Silver => 0.65,
            CreatorTier::Gold => 0.70,
            CreatorTier::Genesis => 0.75,
        }
    }
}

/// Account standing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountStatus {
    Active,
    Probation,
    Suspended,
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AccountStatus::Active => "ACTIVE",
            AccountStatus::Probation => "PROBATION",
            AccountStatus::Suspended => "SUSPENDED",
        };
        f.write_str(s)
    }
}

/// Lower bound of the trust score.
pub const TRUST_SCORE_MIN: i32 = 0;
/// Upper bound of the trust score.
pub const TRUST_SCORE_MAX: i32 = 100;
/// Trust score of a new account.
pub const TRUST_SCORE_DEFAULT: i32 = 50;

/// A user who can author posts, engage, and earn.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Creator {
    pub id: UserId,
    pub tier: CreatorTier,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub phone_verified: bool,
    /// Ownership / NFT bonus flag (1.5x multiplier).
    #[serde(default)]
    pub ownership_bonus: bool,
    pub status: AccountStatus,
    #[serde(default)]
    pub probation_until: Option<u64>,
    pub trust_score: i32,
    pub created_at: u64,
    /// Lifetime earnings credited to this creator.
    #[serde(default)]
    pub total_earnings: f64,
}

impl Creator {
    /// Creates an ACTIVE, unverified STANDARD creator.
    pub fn new(id: impl Into<UserId>, created_at: u64) -> Self {
        Self {
            id: id.into(),
            tier: CreatorTier::Standard,
            email_verified: false,
            phone_verified: false,
            ownership_bonus: false,
            status: AccountStatus::Active,
            probation_until: None,
            trust_score: TRUST_SCORE_DEFAULT,
            created_at,
            total_earnings: 0.0,
        }
    }

    /// Whole days since the account was created.
    #[must_use]
    pub fn account_age_days(&self, now: u64) -> u64 {
        crate::time::whole_days_between(self.created_at, now)
    }

    /// Whether the creator may currently earn.
    ///
    /// ACTIVE → yes. PROBATION → only once `probation_until` has passed.
    /// SUSPENDED → no.
    #[must_use]
    pub fn can_earn(&self, now: u64) -> bool {
        match self.status {
            AccountStatus::Active => true,
            AccountStatus::Probation => match self.probation_until {
                Some(until) => now >= until,
                None => true,
            },
            AccountStatus::Suspended => false,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// EARNINGS LEDGER
// ════════════════════════════════════════════════════════════════════════════════

/// One credit to a creator's ledger.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EarningRecord {
    pub id: String,
    pub owner_id: UserId,
    pub post_id: PostId,
    pub amount: f64,
    pub created_at: u64,
    #[serde(default)]
    pub paid: bool,
    #[serde(default)]
    pub held_until: Option<u64>,
    #[serde(default)]
    pub hold_reason: Option<String>,
}

impl EarningRecord {
    /// Whether a hold is still in force at `now`.
    #[must_use]
    pub fn is_held(&self, now: u64) -> bool {
        self.held_until.map_or(false, |until| now < until)
    }

    /// Extends the hold to `until`. A hold only ever moves forward: if the
    /// current hold already ends at or after `until`, nothing changes.
    ///
    /// Returns `true` if the record changed.
    pub fn extend_hold(&mut self, until: u64, reason: &str) -> bool {
        match self.held_until {
            Some(current) if current >= until => false,
            _ => {
                self.held_until = Some(until);
                self.hold_reason = Some(reason.to_string());
                true
            }
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// STRIKES
// ════════════════════════════════════════════════════════════════════════════════

/// Why a warning was issued.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WarningReason {
    /// Engagement on one of the creator's posts arrived too fast.
    EngagementVelocity,
    /// The creator engaged with other posts too fast.
    ActivityVelocity,
    /// Engagement on a post is concentrated in a few accounts.
    LowEngagementDiversity,
}

impl fmt::Display for WarningReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WarningReason::EngagementVelocity => "ENGAGEMENT_VELOCITY",
            WarningReason::ActivityVelocity => "ACTIVITY_VELOCITY",
            WarningReason::LowEngagementDiversity => "LOW_ENGAGEMENT_DIVERSITY",
        };
        f.write_str(s)
    }
}

/// Side effect attached to a strike level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StrikeAction {
    /// Level 1: recorded and logged.
    LogOnly,
    /// Level 2: the creator is notified.
    Notify,
    /// Level 3: probation, all unpaid earnings held until it ends.
    HoldEarnings { probation_days: u32 },
    /// Level 4: suspension, earnings held until a manual-review date.
    Suspend { review_hold_days: u32 },
}

impl fmt::Display for StrikeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrikeAction::LogOnly => f.write_str("LOG_ONLY"),
            StrikeAction::Notify => f.write_str("EMAIL_NOTIFICATION"),
            StrikeAction::HoldEarnings { .. } => f.write_str("HOLD_EARNINGS"),
            StrikeAction::Suspend { .. } => f.write_str("SUSPEND_ACCOUNT"),
        }
    }
}

/// A recorded strike.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WarningRecord {
    pub id: String,
    pub owner_id: UserId,
    pub reason: WarningReason,
    #[serde(default)]
    pub details: serde_json::Value,
    /// 1..=4
    pub strike_level: u8,
    pub message: String,
    pub action: StrikeAction,
    pub created_at: u64,
    #[serde(default)]
    pub expires_at: Option<u64>,
    #[serde(default)]
    pub cleared_at: Option<u64>,
    #[serde(default)]
    pub cleared_by: Option<String>,
}

impl WarningRecord {
    /// Counts toward the rolling strike total.
    #[must_use]
    pub fn is_active(&self, window_start: u64) -> bool {
        self.cleared_at.is_none() && self.created_at >= window_start
    }

    /// Uncleared and past its expiry.
    #[must_use]
    pub fn is_expired(&self, now: u64) -> bool {
        self.cleared_at.is_none() && self.expires_at.map_or(false, |at| at <= now)
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// FLAGGED CONTENT
// ════════════════════════════════════════════════════════════════════════════════

/// Reason a post was flagged for review.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FlagReason {
    VelocitySpike,
    LowEngagementDiversity,
}

impl fmt::Display for FlagReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FlagReason::VelocitySpike => "VELOCITY_SPIKE",
            FlagReason::LowEngagementDiversity => "LOW_ENGAGEMENT_DIVERSITY",
        };
        f.write_str(s)
    }
}

/// Admin verdict on a flagged post.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewDecision {
    /// False positive; the creator's trust score goes up.
    Cleared,
    /// Manipulation confirmed; the creator's trust score goes down.
    Confirmed,
}

/// A post awaiting (or past) manual review.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FlaggedContent {
    pub id: String,
    pub content_id: PostId,
    pub content_type: ContentType,
    pub reason: FlagReason,
    #[serde(default)]
    pub details: serde_json::Value,
    pub flagged_at: u64,
    /// Hold placed on the post's earnings by this flag, if any.
    #[serde(default)]
    pub hold_until: Option<u64>,
    #[serde(default)]
    pub resolved: bool,
    #[serde(default)]
    pub decision: Option<ReviewDecision>,
    #[serde(default)]
    pub reviewed_by: Option<UserId>,
    #[serde(default)]
    pub review_notes: Option<String>,
    #[serde(default)]
    pub resolved_at: Option<u64>,
}

impl FlaggedContent {
    /// Creates an unresolved flag.
    pub fn new(
        id: impl Into<String>,
        post: &Post,
        reason: FlagReason,
        details: serde_json::Value,
        flagged_at: u64,
    ) -> Self {
        Self {
            id: id.into(),
            content_id: post.id.clone(),
            content_type: post.content_type,
            reason,
            details,
            flagged_at,
            hold_until: None,
            resolved: false,
            decision: None,
            reviewed_by: None,
            review_notes: None,
            resolved_at: None,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// TESTS
// ════════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn record(held_until: Option<u64>) -> EarningRecord {
        EarningRecord {
            id: "e1".to_string(),
            owner_id: "u1".to_string(),
            post_id: "p1".to_string(),
            amount: 1.0,
            created_at: 0,
            paid: false,
            held_until,
            hold_reason: None,
        }
    }

    #[test]
    fn test_extend_hold_from_none() {
        let mut r = record(None);
        assert!(r.extend_hold(500, "velocity"));
        assert_eq!(r.held_until, Some(500));
        assert_eq!(r.hold_reason.as_deref(), Some("velocity"));
    }

    #[test]
    fn test_extend_hold_never_moves_earlier() {
        let mut r = record(Some(1_000));
        assert!(!r.extend_hold(500, "probation"));
        assert_eq!(r.held_until, Some(1_000));
        assert!(r.hold_reason.is_none());
    }

    #[test]
    fn test_extend_hold_moves_forward() {
        let mut r = record(Some(1_000));
        assert!(r.extend_hold(2_000, "suspension"));
        assert_eq!(r.held_until, Some(2_000));
    }

    #[test]
    fn test_is_held_boundary() {
        let r = record(Some(100));
        assert!(r.is_held(99));
        assert!(!r.is_held(100));
        assert!(!record(None).is_held(0));
    }

    #[test]
    fn test_can_earn_by_status() {
        let mut c = Creator::new("u1", 0);
        assert!(c.can_earn(10));

        c.status = AccountStatus::Probation;
        c.probation_until = Some(100);
        assert!(!c.can_earn(99));
        assert!(c.can_earn(100));

        c.status = AccountStatus::Suspended;
        assert!(!c.can_earn(u64::MAX));
    }

    #[test]
    fn test_tier_shares_increase() {
        let tiers = [
            CreatorTier::Standard,
            CreatorTier::Bronze,
            CreatorTier::Silver,
            CreatorTier::Gold,
            CreatorTier::Genesis,
        ];
        for pair in tiers.windows(2) {
            assert!(pair[0].revenue_share() < pair[1].revenue_share());
        }
        assert_eq!(CreatorTier::Standard.revenue_share(), 0.55);
        assert_eq!(CreatorTier::Genesis.revenue_share(), 0.75);
    }

    #[test]
    fn test_warning_activity_and_expiry() {
        let mut w = WarningRecord {
            id: "w1".to_string(),
            owner_id: "u1".to_string(),
            reason: WarningReason::EngagementVelocity,
            details: serde_json::Value::Null,
            strike_level: 1,
            message: String::new(),
            action: StrikeAction::LogOnly,
            created_at: 1_000,
            expires_at: Some(2_000),
            cleared_at: None,
            cleared_by: None,
        };
        assert!(w.is_active(1_000));
        assert!(!w.is_active(1_001));
        assert!(!w.is_expired(1_999));
        assert!(w.is_expired(2_000));

        w.cleared_at = Some(2_000);
        assert!(!w.is_active(0));
        assert!(!w.is_expired(5_000));
    }

    #[test]
    fn test_strike_action_serde_tagged() {
        let json = serde_json::to_string(&StrikeAction::HoldEarnings { probation_days: 7 })
            .expect("serialize");
        assert!(json.contains("HOLD_EARNINGS"));
        assert!(json.contains("probation_days"));
        let back: StrikeAction = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, StrikeAction::HoldEarnings { probation_days: 7 });
    }

    #[test]
    fn test_round_amount() {
        assert_eq!(round_amount(1.2000004), 1.2);
        assert_eq!(round_amount(0.1 + 0.2), 0.3);
    }

    #[test]
    fn test_content_type_is_video() {
        assert!(ContentType::Video.is_video());
        assert!(ContentType::ShortVideo.is_video());
        assert!(!ContentType::Text.is_video());
        assert!(!ContentType::Article.is_video());
    }
}
