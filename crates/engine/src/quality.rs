//! # Quality & Raw-Earnings Calculator
//!
//! Pure functions from engagement counts and content attributes to a raw
//! monetary amount.
//!
//! ## Formula
//!
//! ```text
//! quality  = likes × 1 + Σ comment_weight(len) + shares × 20
//! base     = quality × rate_per_point
//! raw      = base × content × completion × tier × ownership
//! ```
//!
//! | Comment length | Weight |
//! |----------------|--------|
//! | < 50 chars | 2 |
//! | 50..200 chars | 5 |
//! | ≥ 200 chars | 8 |
//!
//! ## Determinism
//!
//! No store access, no clock, no randomness. The same inputs give the same amount on
//! every call, and raising any engagement count never lowers the result.

use serde::{Deserialize, Serialize};
use tracing::warn;

use earnguard_common::{
    round_amount, ConsumptionMetrics, ContentMetadata, ContentType, Creator, CreatorTier,
    EarningsParams, Post,
};

pub const LIKE_POINTS: u64 = 1;
pub const SHARE_POINTS: u64 = 20;

/// Words per minute used for article reading time.
pub const READING_WPM: f64 = 200.0;

/// Multiplier for creators holding the ownership bonus.
pub const OWNERSHIP_BONUS_MULTIPLIER: f64 = 1.5;

// ════════════════════════════════════════════════════════════════════════════════
// INPUTS
// ════════════════════════════════════════════════════════════════════════════════

/// Everything the calculator reads.
#[derive(Debug, Clone, PartialEq)]
pub struct QualityInputs {
    pub likes: u64,
    /// Character length of every comment on the post.
    pub comment_lengths: Vec<u32>,
    /// Comments counted on the post with no logged event. Each scores as a
    /// short comment.
    pub unlogged_comments: u64,
    pub shares: u64,
    pub content_type: ContentType,
    pub metadata: ContentMetadata,
    pub consumption: ConsumptionMetrics,
    pub tier: CreatorTier,
    pub ownership_bonus: bool,
}

impl QualityInputs {
    /// Builds inputs from stored records.
    ///
    /// If the post counts more comments than `comment_lengths` holds, the
    /// surplus is carried as [`QualityInputs::unlogged_comments`].
    pub fn from_post(post: &Post, creator: &Creator, comment_lengths: Vec<u32>) -> Self {
        let logged = comment_lengths.len() as u64;
        let unlogged_comments = post.comments.saturating_sub(logged);
        if unlogged_comments > 0 {
            warn!(
                post_id = %post.id,
                counted = post.comments,
                logged,
                "comment counter ahead of comment events; surplus scored as short comments"
            );
        }
        Self {
            likes: post.likes,
            comment_lengths,
            unlogged_comments,
            shares: post.shares,
            content_type: post.content_type,
            metadata: post.metadata.clone(),
            consumption: post.consumption.clone(),
            tier: creator.tier,
            ownership_bonus: creator.ownership_bonus,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// SCORE
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityScore {
    pub like_points: u64,
    pub comment_points: u64,
    pub share_points: u64,
    pub total: u64,
}

/// Weight of one comment by character length.
#[must_use]
pub fn comment_weight(chars: u32) -> u64 {
    match chars {
        0..=49 => 2,
        50..=199 => 5,
        _ => 8,
    }
}

#[must_use]
pub fn quality_score(likes: u64, comment_lengths: &[u32], shares: u64) -> QualityScore {
    let like_points = likes.saturating_mul(LIKE_POINTS);
    let comment_points = comment_lengths
        .iter()
        .fold(0u64, |acc, &len| acc.saturating_add(comment_weight(len)));
    let share_points = shares.saturating_mul(SHARE_POINTS);
    QualityScore {
        like_points,
        comment_points,
        share_points,
        total: like_points
            .saturating_add(comment_points)
            .saturating_add(share_points),
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// MULTIPLIERS
// ════════════════════════════════════════════════════════════════════════════════

/// Content-type multiplier by length / duration tier.
#[must_use]
pub fn content_multiplier(content_type: ContentType, metadata: &ContentMetadata) -> f64 {
    match content_type {
        ContentType::Text => match metadata.char_length {
            0..=999 => 1.0,
            1_000..=4_999 => 1.2,
            _ => 1.3,
        },
        ContentType::Article => {
            let minutes = f64::from(metadata.word_count) / READING_WPM;
            if minutes < 5.0 {
                1.2
            } else if minutes < 10.0 {
                1.3
            } else {
                1.5
            }
        }
        ContentType::Video => {
            let minutes = f64::from(metadata.duration_secs) / 60.0;
            if minutes < 5.0 {
                1.1
            } else if minutes < 15.0 {
                1.3
            } else {
                1.5
            }
        }
        ContentType::ShortVideo => 1.0,
    }
}

/// Completion multiplier. Video types read watch percentage, the others
/// scroll depth. No data (zero) is neutral.
#[must_use]
pub fn completion_multiplier(content_type: ContentType, consumption: &ConsumptionMetrics) -> f64 {
    let pct = if content_type.is_video() {
        consumption.watch_pct
    } else {
        consumption.scroll_depth_pct
    };
    if !(pct > 0.0) {
        1.0
    } else if pct < 50.0 {
        0.85
    } else if pct < 70.0 {
        1.0
    } else if pct < 85.0 {
        1.15
    } else {
        1.3
    }
}

#[must_use]
pub fn tier_multiplier(tier: CreatorTier, baseline_share: f64) -> f64 {
    tier.revenue_share() / baseline_share
}

#[must_use]
pub fn ownership_multiplier(bonus: bool) -> f64 {
    if bonus {
        OWNERSHIP_BONUS_MULTIPLIER
    } else {
        1.0
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// BREAKDOWN
// ════════════════════════════════════════════════════════════════════════════════

/// Raw earnings attributed to each engagement type, same ratio as points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TypeBreakdown {
    pub likes: f64,
    pub comments: f64,
    pub shares: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EarningsBreakdown {
    pub quality: QualityScore,
    pub base_earnings: f64,
    pub content_multiplier: f64,
    pub completion_multiplier: f64,
    pub tier_multiplier: f64,
    pub ownership_multiplier: f64,
    /// Product of the four multipliers.
    pub combined_multiplier: f64,
    pub raw_earnings: f64,
    pub by_type: TypeBreakdown,
}

/// Computes raw earnings with a per-factor breakdown.
#[must_use]
pub fn calculate_raw_earnings(inputs: &QualityInputs, params: &EarningsParams) -> EarningsBreakdown {
    let mut quality = quality_score(inputs.likes, &inputs.comment_lengths, inputs.shares);
    let unlogged = inputs.unlogged_comments.saturating_mul(comment_weight(0));
    quality.comment_points = quality.comment_points.saturating_add(unlogged);
    quality.total = quality.total.saturating_add(unlogged);
    let rate = params.rate_per_point;

    let content = content_multiplier(inputs.content_type, &inputs.metadata);
    let completion = completion_multiplier(inputs.content_type, &inputs.consumption);
    let tier = tier_multiplier(inputs.tier, params.baseline_share);
    let ownership = ownership_multiplier(inputs.ownership_bonus);
    let combined = content * completion * tier * ownership;

    let per_point = rate * combined;
    let base_earnings = round_amount(quality.total as f64 * rate);
    let raw_earnings = round_amount(quality.total as f64 * per_point);

    EarningsBreakdown {
        quality,
        base_earnings,
        content_multiplier: content,
        completion_multiplier: completion,
        tier_multiplier: tier,
        ownership_multiplier: ownership,
        combined_multiplier: combined,
        raw_earnings,
        by_type: TypeBreakdown {
            likes: round_amount(quality.like_points as f64 * per_point),
            comments: round_amount(quality.comment_points as f64 * per_point),
            shares: round_amount(quality.share_points as f64 * per_point),
        },
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// TESTS
// ════════════════════════════════════════════════════════════════════════════════
