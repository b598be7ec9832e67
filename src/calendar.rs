use chrono::{Datelike, NaiveDate, Weekday};
use std::collections::BTreeSet;

/// Calendrier immuable : week-ends, jours fériés, jours "spéciaux".
///
/// Un jour spécial est un vendredi, un samedi, un dimanche, un férié ou une
/// veille de férié.
#[derive(Debug, Clone, Default)]
pub struct Calendar {
    holidays: BTreeSet<NaiveDate>,
}

impl Calendar {
    pub fn new(holidays: BTreeSet<NaiveDate>) -> Self {
        Self { holidays }
    }

    pub fn is_weekend(&self, date: NaiveDate) -> bool {
        matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
    }

    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        self.holidays.contains(&date)
    }

    /// Veille de férié.
    pub fn is_pre_holiday(&self, date: NaiveDate) -> bool {
        date.succ_opt()
            .map(|next| self.holidays.contains(&next))
            .unwrap_or(false)
    }

    pub fn is_special(&self, date: NaiveDate) -> bool {
        date.weekday() == Weekday::Fri
            || self.is_weekend(date)
            || self.is_holiday(date)
            || self.is_pre_holiday(date)
    }

    /// 0 = lundi … 6 = dimanche.
    pub fn weekday_index(date: NaiveDate) -> u32 {
        date.weekday().num_days_from_monday()
    }

    /// Clé (année, mois) pour les compteurs mensuels.
    pub fn month_key(date: NaiveDate) -> (i32, u32) {
        (date.year(), date.month())
    }

    /// Index de semaine relatif au lundi de la semaine de `origin`.
    ///
    /// Deux dates partagent le même index ssi elles tombent dans la même
    /// semaine civile ; sert au comptage des week-ends consécutifs.
    pub fn week_index(origin: NaiveDate, date: NaiveDate) -> i64 {
        let monday = origin
            - chrono::Duration::days(i64::from(origin.weekday().num_days_from_monday()));
        date.signed_duration_since(monday).num_days().div_euclid(7)
    }
}

/// Jours de `start` à `end` inclus.
pub fn days_inclusive(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut out = Vec::new();
    let mut current = start;
    while current <= end {
        out.push(current);
        match current.succ_opt() {
            Some(next) => current = next,
            None => break,
        }
    }
    out
}
