//! Time-weighted sell scheduling.
//!
//! The UTC day is split into fixed-size buckets. Each bucket gets an equal
//! share of the day's sell cap, spread over the hours we are allowed to
//! sell, and every call emits one child order of randomized size inside the
//! current bucket. Whatever was not sold in earlier buckets is folded into
//! the next one along a geometric series, so most of it is absorbed early.

use super::{Level, LevelProvider, RateOffset};
use crate::error::{EngineError, Result};
use crate::feed::PriceFeed;
use crate::filter::VolumeFilter;
use crate::model::{Number, OrderConstraints};
use crate::utils::decimal::{geometric_first_term, unit_fraction};
use async_trait::async_trait;
use chrono::{DateTime, Datelike, Timelike, Utc};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

const SECONDS_IN_HOUR: u32 = 3600;
const SECONDS_IN_DAY: u32 = 86_400;

/// Pacing parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct TwapParams {
    pub hours_to_sell: u32,
    pub bucket_size_seconds: u32,
    /// Fraction of the remaining buckets the surplus is spread over
    pub distribute_surplus_ceiling: Decimal,
    /// Ratio between consecutive surplus shares
    pub smoothing_factor: Decimal,
    /// Smallest child order as a fraction of the average bucket
    pub min_child_fraction: Decimal,
    pub seed: u64,
}

impl TwapParams {
    fn validate(&self) -> Result<()> {
        if self.hours_to_sell == 0 || self.hours_to_sell > 24 {
            return Err(EngineError::config(format!(
                "hours to sell must be in (0, 24], was {}",
                self.hours_to_sell
            )));
        }
        if self.bucket_size_seconds == 0 || self.bucket_size_seconds > SECONDS_IN_DAY {
            return Err(EngineError::config(format!(
                "bucket size must be in (0, {}] seconds, was {}",
                SECONDS_IN_DAY, self.bucket_size_seconds
            )));
        }
        if SECONDS_IN_DAY % self.bucket_size_seconds != 0 {
            return Err(EngineError::config(format!(
                "bucket size must divide {} seconds, was {}",
                SECONDS_IN_DAY, self.bucket_size_seconds
            )));
        }
        for (name, value) in [
            ("distribute surplus ceiling", self.distribute_surplus_ceiling),
            ("smoothing factor", self.smoothing_factor),
            ("min child order fraction", self.min_child_fraction),
        ] {
            if value < Decimal::ZERO || value > Decimal::ONE {
                return Err(EngineError::config(format!(
                    "{} must be in [0, 1], was {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

/// Values refreshed on every round.
#[derive(Debug, Clone, PartialEq)]
struct DynamicBucketValues {
    is_new: bool,
    round_id: u64,
    day_base_sold: Decimal,
    base_sold: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
struct BucketInfo {
    id: u32,
    total_buckets: u32,
    total_buckets_targeted: u32,
    day_base_sold_start: Decimal,
    day_base_capacity: Decimal,
    base_surplus_included: Decimal,
    base_capacity: Decimal,
    min_order_size_base: Decimal,
    dynamic: DynamicBucketValues,
}

impl BucketInfo {
    fn base_remaining(&self) -> Decimal {
        self.base_capacity - self.dynamic.base_sold
    }

    fn day_base_remaining(&self) -> Decimal {
        self.day_base_capacity - self.dynamic.day_base_sold
    }
}

impl fmt::Display for BucketInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Bucket[id={}, total={}, targeted={}, day_sold_start={}, day_capacity={}, surplus_included={}, capacity={}, min_order={}, new={}, round={}, day_sold={}, day_remaining={}, sold={}, remaining={}]",
            self.id,
            self.total_buckets,
            self.total_buckets_targeted,
            self.day_base_sold_start,
            self.day_base_capacity,
            self.base_surplus_included,
            self.base_capacity,
            self.min_order_size_base,
            self.dynamic.is_new,
            self.dynamic.round_id,
            self.dynamic.day_base_sold,
            self.day_base_remaining(),
            self.dynamic.base_sold,
            self.base_remaining(),
        )
    }
}

/// Emits one sell level per call, paced across the day.
pub struct SellTwapLevelProvider {
    feed: Arc<dyn PriceFeed>,
    offset: RateOffset,
    constraints: OrderConstraints,
    /// Indexed by days from Sunday
    dow_filters: Vec<Arc<VolumeFilter>>,
    params: TwapParams,
    rng: ChaCha8Rng,
    active_bucket: Option<BucketInfo>,
    previous_round_id: Option<u64>,
}

impl SellTwapLevelProvider {
    pub fn new(
        feed: Arc<dyn PriceFeed>,
        offset: RateOffset,
        constraints: OrderConstraints,
        dow_filters: Vec<Arc<VolumeFilter>>,
        params: TwapParams,
    ) -> Result<Self> {
        params.validate()?;
        if dow_filters.len() != 7 {
            return Err(EngineError::config(format!(
                "expected one volume filter per weekday, got {}",
                dow_filters.len()
            )));
        }
        for (i, filter) in dow_filters.iter().enumerate() {
            if !filter.is_selling_base() {
                return Err(EngineError::config(format!(
                    "volume filter at index {} does not sell the base asset: {}",
                    i,
                    filter.config()
                )));
            }
            filter.must_base_cap_in_base_units()?;
        }

        let rng = ChaCha8Rng::seed_from_u64(params.seed);
        Ok(Self {
            feed,
            offset,
            constraints,
            dow_filters,
            params,
            rng,
            active_bucket: None,
            previous_round_id: None,
        })
    }

    /// The level to place at `now`, or nothing when the bucket is spent.
    pub async fn next_level_at(
        &mut self,
        now: DateTime<Utc>,
        max_base: Decimal,
        _max_quote: Decimal,
    ) -> Result<Vec<Level>> {
        let filter = self.filter_for(now)?;
        let round_id = self.previous_round_id.map_or(0, |id| id + 1);
        let bucket = self.make_bucket_info(now, &filter, round_id)?;
        info!(%bucket, "Bucket info");

        let size = self.round_size(&bucket);
        let price = self.feed.get_price().await?;
        let adjusted = self.offset.apply(price);
        if self.offset.is_modified() {
            debug!(%price, %adjusted, "Feed price adjusted");
        }
        info!(round_id, bucket_id = bucket.id, %size, price = %adjusted, "Round info");

        self.active_bucket = Some(bucket);
        self.previous_round_id = Some(round_id);

        let amount = size.min(max_base);
        if amount <= Decimal::ZERO {
            info!(%size, %max_base, "Nothing left to sell this round");
            return Ok(Vec::new());
        }
        Ok(vec![Level {
            price: Number::new(adjusted, self.constraints.price_precision),
            amount: Number::new(amount, self.constraints.volume_precision),
        }])
    }

    fn filter_for(&self, now: DateTime<Utc>) -> Result<Arc<VolumeFilter>> {
        let day = now.weekday().num_days_from_sunday() as usize;
        self.dow_filters.get(day).cloned().ok_or_else(|| {
            EngineError::InvariantViolation(format!("no volume filter for weekday {}", day))
        })
    }

    fn make_bucket_info(
        &self,
        now: DateTime<Utc>,
        filter: &VolumeFilter,
        round_id: u64,
    ) -> Result<BucketInfo> {
        let bucket_id = now.num_seconds_from_midnight() / self.params.bucket_size_seconds;
        match &self.active_bucket {
            None => self.first_bucket_frame(now, filter, bucket_id, round_id),
            Some(active) if active.id == bucket_id => {
                let day_base_sold = filter.daily_values(now.date_naive())?.base_vol;
                Ok(BucketInfo {
                    dynamic: DynamicBucketValues {
                        is_new: false,
                        round_id,
                        day_base_sold,
                        base_sold: day_base_sold - active.day_base_sold_start,
                    },
                    ..active.clone()
                })
            }
            Some(active) => self.cutover(active, now, filter, bucket_id, round_id),
        }
    }

    fn first_bucket_frame(
        &self,
        now: DateTime<Utc>,
        filter: &VolumeFilter,
        bucket_id: u32,
        round_id: u64,
    ) -> Result<BucketInfo> {
        let size = self.params.bucket_size_seconds;
        let total_buckets = SECONDS_IN_DAY / size;
        let total_buckets_targeted = (self.params.hours_to_sell * SECONDS_IN_HOUR).div_ceil(size);

        let day_base_capacity = filter.must_base_cap_in_base_units()?;
        let day_base_sold_start = filter.daily_values(now.date_naive())?.base_vol;
        let base_capacity = day_base_capacity / Decimal::from(total_buckets_targeted);

        Ok(BucketInfo {
            id: bucket_id,
            total_buckets,
            total_buckets_targeted,
            day_base_sold_start,
            day_base_capacity,
            base_surplus_included: Decimal::ZERO,
            base_capacity,
            min_order_size_base: self.params.min_child_fraction * base_capacity,
            dynamic: DynamicBucketValues {
                is_new: true,
                round_id,
                day_base_sold: day_base_sold_start,
                base_sold: Decimal::ZERO,
            },
        })
    }

    fn cutover(
        &self,
        previous: &BucketInfo,
        now: DateTime<Utc>,
        filter: &VolumeFilter,
        bucket_id: u32,
        round_id: u64,
    ) -> Result<BucketInfo> {
        if bucket_id != previous.id + 1 {
            return Err(EngineError::InvariantViolation(format!(
                "new bucket id ({}) was not one more than the previous bucket id ({})",
                bucket_id, previous.id
            )));
        }

        let mut bucket = self.first_bucket_frame(now, filter, bucket_id, round_id)?;
        // the fresh query can include sales made after the previous bucket's last round
        let day_base_sold = bucket.day_base_sold_start;
        let day_base_sold_start = previous.dynamic.day_base_sold;
        bucket.day_base_sold_start = day_base_sold_start;
        bucket.dynamic.day_base_sold = day_base_sold;
        bucket.dynamic.base_sold = day_base_sold - day_base_sold_start;

        // bucket ids are 0-indexed, so the id is the number of elapsed buckets
        let average_capacity = bucket.base_capacity;
        let expected_sold = average_capacity * Decimal::from(bucket_id);
        let total_surplus = expected_sold - day_base_sold_start;
        let remaining_buckets = bucket.total_buckets.saturating_sub(bucket_id);
        bucket.base_surplus_included = self.first_surplus_share(total_surplus, remaining_buckets);
        bucket.base_capacity = (average_capacity + bucket.base_surplus_included).max(Decimal::ZERO);

        debug!(
            bucket_id,
            %total_surplus,
            remaining_buckets,
            increment = %bucket.base_surplus_included,
            "Cut over to new bucket"
        );
        Ok(bucket)
    }

    /// First term of the geometric series spreading `total_surplus` over
    /// `ceil(ceiling * remaining_buckets)` buckets.
    fn first_surplus_share(&self, total_surplus: Decimal, remaining_buckets: u32) -> Decimal {
        let n = (self.params.distribute_surplus_ceiling * Decimal::from(remaining_buckets))
            .ceil()
            .to_u64()
            .unwrap_or(0);
        geometric_first_term(total_surplus, self.params.smoothing_factor, n)
    }

    fn round_size(&mut self, bucket: &BucketInfo) -> Decimal {
        let remaining = bucket.base_remaining();
        let min = bucket.min_order_size_base;
        if remaining <= min {
            return remaining;
        }
        let u = unit_fraction(self.rng.gen::<f64>());
        min + u * (remaining - min)
    }
}

#[async_trait]
impl LevelProvider for SellTwapLevelProvider {
    async fn get_levels(&mut self, max_base: Decimal, max_quote: Decimal) -> Result<Vec<Level>> {
        self.next_level_at(Utc::now(), max_base, max_quote).await
    }
}
