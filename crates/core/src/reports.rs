//! Report aggregation over a fetched record set
//!
//! The periodical and patient report views never ask the backend for
//! aggregates; they group the same EHR rows returned by the lookup. Every
//! function here is pure over a slice of records.

use crate::error::{CoreError, CoreResult};
use crate::types::{ElectronicHealthRecord, JalaliDate};
use regex::Regex;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

/// Default number of services shown by [`Reports::top_services`]
pub const DEFAULT_TOP_SERVICES: usize = 10;

/// Number of rows for one date
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateCount {
    pub date: String,
    pub count: usize,
}

/// Normal/abnormal tally for one laboratory service
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceResultCount {
    pub service_name: String,
    pub total: usize,
    pub normal: usize,
    pub abnormal: usize,
}

impl ServiceResultCount {
    pub const fn is_fully_abnormal(&self) -> bool {
        self.total == self.abnormal
    }
}

/// Number of rows for one service
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceCount {
    pub service_name: String,
    pub count: usize,
}

/// One measurement of a service over time, with the normal band it was
/// reported against
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendPoint {
    pub date: String,
    pub test_value: Option<f64>,
    pub normal_range_min: f64,
    pub normal_range_max: f64,
}

/// Parses normal-range text such as `0.2-1.2`
#[derive(Debug, Clone)]
pub struct RangeClassifier {
    range_pattern: Regex,
}

impl RangeClassifier {
    pub fn new() -> CoreResult<Self> {
        Ok(Self {
            range_pattern: Regex::new(r"([0-9]+\.?[0-9]*)-([0-9]+\.?[0-9]*)")
                .map_err(|e| CoreError::invalid_config(format!("range pattern: {e}")))?,
        })
    }

    /// Lower and upper bound of the first range found in `text`
    pub fn bounds(&self, text: &str) -> Option<(f64, f64)> {
        let caps = self.range_pattern.captures(text)?;
        let min = caps.get(1)?.as_str().parse().ok()?;
        let max = caps.get(2)?.as_str().parse().ok()?;
        Some((min, max))
    }

    /// Whether `value` lies inside `normal_range`, bounds inclusive.
    ///
    /// Unparsable values or ranges count as outside.
    pub fn is_within_normal_range(&self, value: &str, normal_range: &str) -> bool {
        if value.is_empty() || normal_range.is_empty() {
            return false;
        }
        let Some((min, max)) = self.bounds(normal_range) else {
            return false;
        };
        leading_float(value).is_some_and(|v| v >= min && v <= max)
    }
}

/// Parse the longest numeric prefix of `text`, skipping leading whitespace
pub fn leading_float(text: &str) -> Option<f64> {
    let text = text.trim_start();
    let bytes = text.as_bytes();
    let mut end = 0;

    if matches!(bytes.first(), Some(b'+' | b'-')) {
        end += 1;
    }
    let int_start = end;
    while end < bytes.len() && bytes[end].is_ascii_digit() {
        end += 1;
    }
    let mut digits = end - int_start;
    if end < bytes.len() && bytes[end] == b'.' {
        let frac_start = end + 1;
        let mut frac_end = frac_start;
        while frac_end < bytes.len() && bytes[frac_end].is_ascii_digit() {
            frac_end += 1;
        }
        digits += frac_end - frac_start;
        if digits > 0 {
            end = frac_end;
        }
    }
    if digits == 0 {
        return None;
    }
    if end < bytes.len() && matches!(bytes[end], b'e' | b'E') {
        let mut exp_end = end + 1;
        if exp_end < bytes.len() && matches!(bytes[exp_end], b'+' | b'-') {
            exp_end += 1;
        }
        let exp_digits_start = exp_end;
        while exp_end < bytes.len() && bytes[exp_end].is_ascii_digit() {
            exp_end += 1;
        }
        if exp_end > exp_digits_start {
            end = exp_end;
        }
    }

    text[..end].parse().ok()
}

fn is_blank(value: Option<&str>) -> bool {
    value.is_none_or(|v| v.trim().is_empty())
}

/// Sort by Jalali date; rows whose date cannot be parsed keep their relative
/// order after every dated row
fn sort_by_jalali_date<T>(items: &mut [T], date_of: impl Fn(&T) -> &str) {
    items.sort_by_key(|item| match date_of(item).parse::<JalaliDate>() {
        Ok(date) => (false, Some(date)),
        Err(_) => (true, None),
    });
}

/// Aggregations behind the report views
#[derive(Debug, Clone)]
pub struct Reports<'a> {
    records: &'a [ElectronicHealthRecord],
    classifier: RangeClassifier,
}

impl<'a> Reports<'a> {
    pub fn new(records: &'a [ElectronicHealthRecord]) -> CoreResult<Self> {
        Ok(Self {
            records,
            classifier: RangeClassifier::new()?,
        })
    }

    pub const fn records(&self) -> &'a [ElectronicHealthRecord] {
        self.records
    }

    /// Rows per date, ordered by date
    pub fn record_counts_by_date(&self) -> Vec<DateCount> {
        let mut order: Vec<&str> = Vec::new();
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for record in self.records {
            let date = record.date.as_str();
            let count = counts.entry(date).or_insert_with(|| {
                order.push(date);
                0
            });
            *count += 1;
        }

        let mut result: Vec<DateCount> = order
            .into_iter()
            .map(|date| DateCount {
                date: date.to_string(),
                count: counts[date],
            })
            .collect();
        sort_by_jalali_date(&mut result, |c| &c.date);
        result
    }

    /// Distinct patients per date, ordered by date
    pub fn patient_counts_by_date(&self) -> Vec<DateCount> {
        let mut order: Vec<&str> = Vec::new();
        let mut patients: HashMap<&str, HashSet<i64>> = HashMap::new();
        for record in self.records {
            let date = record.date.as_str();
            patients
                .entry(date)
                .or_insert_with(|| {
                    order.push(date);
                    HashSet::new()
                })
                .insert(record.patient_code);
        }

        let mut result: Vec<DateCount> = order
            .into_iter()
            .map(|date| DateCount {
                date: date.to_string(),
                count: patients[date].len(),
            })
            .collect();
        sort_by_jalali_date(&mut result, |c| &c.date);
        result
    }

    /// Normal/abnormal tally per service over rows that carry both an
    /// answer and a normal range. Services appear in first-seen order.
    pub fn service_result_counts(&self) -> Vec<ServiceResultCount> {
        let mut result: Vec<ServiceResultCount> = Vec::new();
        let mut index: HashMap<&str, usize> = HashMap::new();

        for record in self.records {
            let answer = record.answer.as_deref();
            let range = record.normal_range.as_deref();
            if is_blank(answer) || is_blank(range) || record.service_name.is_empty() {
                continue;
            }

            let slot = *index.entry(record.service_name.as_str()).or_insert_with(|| {
                result.push(ServiceResultCount {
                    service_name: record.service_name.clone(),
                    total: 0,
                    normal: 0,
                    abnormal: 0,
                });
                result.len() - 1
            });

            let entry = &mut result[slot];
            entry.total += 1;
            if self
                .classifier
                .is_within_normal_range(answer.unwrap_or_default(), range.unwrap_or_default())
            {
                entry.normal += 1;
            } else {
                entry.abnormal += 1;
            }
        }

        result
    }

    /// Services with at least one normal result, most tested first
    pub fn mixed_result_services(&self) -> Vec<ServiceResultCount> {
        let mut services: Vec<_> = self
            .service_result_counts()
            .into_iter()
            .filter(|s| !s.is_fully_abnormal())
            .collect();
        services.sort_by(|a, b| b.total.cmp(&a.total));
        services
    }

    /// Services where every result was abnormal, most tested first
    pub fn fully_abnormal_services(&self) -> Vec<ServiceResultCount> {
        let mut services: Vec<_> = self
            .service_result_counts()
            .into_iter()
            .filter(ServiceResultCount::is_fully_abnormal)
            .collect();
        services.sort_by(|a, b| b.total.cmp(&a.total));
        services
    }

    /// Most frequent services over all rows
    pub fn top_services(&self, limit: usize) -> Vec<ServiceCount> {
        let mut result: Vec<ServiceCount> = Vec::new();
        let mut index: HashMap<&str, usize> = HashMap::new();

        for record in self.records {
            if record.service_name.is_empty() {
                continue;
            }
            let slot = *index.entry(record.service_name.as_str()).or_insert_with(|| {
                result.push(ServiceCount {
                    service_name: record.service_name.clone(),
                    count: 0,
                });
                result.len() - 1
            });
            result[slot].count += 1;
        }

        result.sort_by(|a, b| b.count.cmp(&a.count));
        result.truncate(limit);
        result
    }

    pub fn records_for_service(&self, service_name: &str) -> Vec<&'a ElectronicHealthRecord> {
        self.records
            .iter()
            .filter(|r| r.service_name == service_name)
            .collect()
    }

    /// Measurements of one service over time, ordered by date
    pub fn service_trend(&self, service_name: &str) -> Vec<TrendPoint> {
        let mut points: Vec<TrendPoint> = self
            .records_for_service(service_name)
            .into_iter()
            .filter_map(|record| {
                let answer = record.answer.as_deref().filter(|a| !a.is_empty())?;
                let range = record.normal_range.as_deref().filter(|r| !r.is_empty())?;
                if record.date.is_empty() {
                    return None;
                }
                let (normal_range_min, normal_range_max) =
                    self.classifier.bounds(range).unwrap_or((0.0, 0.0));
                Some(TrendPoint {
                    date: record.date.clone(),
                    test_value: leading_float(answer),
                    normal_range_min,
                    normal_range_max,
                })
            })
            .collect();
        sort_by_jalali_date(&mut points, |p| &p.date);
        points
    }
}
