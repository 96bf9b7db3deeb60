//! Anchor and window resolution

use crate::error::{ConfigurationError, TimingResult};
use chrono::{Days, Months, NaiveDate};
use measurekit_model::{
    MeasurementPeriod, OffsetDirection, TimeUnit, TimingAnchor, TimingBoundary, TimingConstraint,
    TimingOffset, TimingOperator, TimingRequirement, TimingWindow,
};
use std::collections::HashMap;

/// The date sources a resolution runs against.
///
/// Event-relative anchors (index events, encounter/diagnosis/discharge
/// dates) resolve from the event map; the caller derives those dates from
/// the patient record before resolving. `today` is supplied explicitly so
/// resolution never reads the wall clock.
#[derive(Debug, Clone)]
pub struct ResolutionContext {
    pub measurement_period: MeasurementPeriod,
    pub events: HashMap<TimingAnchor, NaiveDate>,
    pub today: NaiveDate,
}

impl ResolutionContext {
    /// Context over a measurement period, with "today" pinned to the period
    /// end for deterministic evaluation
    pub fn new(measurement_period: MeasurementPeriod) -> Self {
        Self {
            measurement_period,
            events: HashMap::new(),
            today: measurement_period.end,
        }
    }

    /// Register a resolved event date for an anchor
    pub fn with_event(mut self, anchor: TimingAnchor, date: NaiveDate) -> Self {
        self.events.insert(anchor, date);
        self
    }

    /// Register a named index event date
    pub fn with_index_event(self, name: impl Into<String>, date: NaiveDate) -> Self {
        self.with_event(TimingAnchor::IndexEvent(name.into()), date)
    }
}

/// Which date of a candidate fact is tested against the resolved window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FactDateMode {
    /// The fact's primary (start) date must fall in the window
    Start,
    /// The fact's end date must fall in the window
    End,
    /// The fact's period must overlap the window
    Overlap,
}

/// A concrete date window; `None` bounds are open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedWindow {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl ResolvedWindow {
    fn checked(start: Option<NaiveDate>, end: Option<NaiveDate>) -> TimingResult<Self> {
        if let (Some(s), Some(e)) = (start, end)
            && e < s
        {
            return Err(ConfigurationError::WindowEndBeforeStart {
                start: s.to_string(),
                end: e.to_string(),
            });
        }
        Ok(Self { start, end })
    }

    /// True when `date` falls inside the window, bounds included
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start.is_none_or(|s| date >= s) && self.end.is_none_or(|e| date <= e)
    }

    /// True when the period `[start, end]` overlaps the window
    pub fn overlaps(&self, start: NaiveDate, end: NaiveDate) -> bool {
        self.start.is_none_or(|s| end >= s) && self.end.is_none_or(|e| start <= e)
    }
}

/// A fully resolved timing requirement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedTiming {
    pub window: ResolvedWindow,
    pub mode: FactDateMode,
}

impl ResolvedTiming {
    /// Apply the requirement to a fact's dates
    pub fn matches(&self, date: NaiveDate, end_date: Option<NaiveDate>) -> bool {
        match self.mode {
            FactDateMode::Start => self.window.contains(date),
            FactDateMode::End => end_date.is_some_and(|e| self.window.contains(e)),
            FactDateMode::Overlap => self.window.overlaps(date, end_date.unwrap_or(date)),
        }
    }
}

/// The single date an anchor stands for
fn anchor_point(anchor: &TimingAnchor, ctx: &ResolutionContext) -> TimingResult<NaiveDate> {
    match anchor {
        TimingAnchor::MeasurementPeriodStart => Ok(ctx.measurement_period.start),
        TimingAnchor::MeasurementPeriodEnd => Ok(ctx.measurement_period.end),
        TimingAnchor::Today => Ok(ctx.today),
        TimingAnchor::IndexEvent(name) => ctx
            .events
            .get(anchor)
            .copied()
            .ok_or_else(|| ConfigurationError::unresolved_index_event(name)),
        _ => ctx
            .events
            .get(anchor)
            .copied()
            .ok_or_else(|| ConfigurationError::unresolved_anchor(anchor.to_string())),
    }
}

/// The span an anchor stands for when used with a containment operator.
/// Measurement-period anchors span the whole period; event anchors are a
/// single day.
fn anchor_span(
    anchor: &TimingAnchor,
    ctx: &ResolutionContext,
) -> TimingResult<(NaiveDate, NaiveDate)> {
    match anchor {
        TimingAnchor::MeasurementPeriodStart | TimingAnchor::MeasurementPeriodEnd => {
            Ok((ctx.measurement_period.start, ctx.measurement_period.end))
        }
        _ => {
            let point = anchor_point(anchor, ctx)?;
            Ok((point, point))
        }
    }
}

/// Shift a date by an offset using calendar arithmetic
fn apply_offset(date: NaiveDate, offset: &TimingOffset) -> TimingResult<NaiveDate> {
    let overflow = || ConfigurationError::OffsetOverflow {
        offset: offset.to_string(),
        anchor: date.to_string(),
    };
    let value = u64::from(offset.value);
    let shifted = match (offset.unit, offset.direction) {
        (TimeUnit::Days, OffsetDirection::After) => date.checked_add_days(Days::new(value)),
        (TimeUnit::Days, OffsetDirection::Before) => date.checked_sub_days(Days::new(value)),
        (TimeUnit::Weeks, OffsetDirection::After) => date.checked_add_days(Days::new(value * 7)),
        (TimeUnit::Weeks, OffsetDirection::Before) => date.checked_sub_days(Days::new(value * 7)),
        (TimeUnit::Months, OffsetDirection::After) => {
            date.checked_add_months(Months::new(offset.value))
        }
        (TimeUnit::Months, OffsetDirection::Before) => {
            date.checked_sub_months(Months::new(offset.value))
        }
        (TimeUnit::Years, OffsetDirection::After) => {
            date.checked_add_months(Months::new(offset.value.saturating_mul(12)))
        }
        (TimeUnit::Years, OffsetDirection::Before) => {
            date.checked_sub_months(Months::new(offset.value.saturating_mul(12)))
        }
    };
    shifted.ok_or_else(overflow)
}

/// Resolve one boundary (anchor + optional offset) to a concrete date
pub fn resolve_boundary(
    boundary: &TimingBoundary,
    ctx: &ResolutionContext,
) -> TimingResult<NaiveDate> {
    let date = anchor_point(&boundary.anchor, ctx)?;
    match &boundary.offset {
        Some(offset) => apply_offset(date, offset),
        None => Ok(date),
    }
}

fn resolve_constraint(
    constraint: &TimingConstraint,
    ctx: &ResolutionContext,
) -> TimingResult<ResolvedTiming> {
    let mode = match constraint.operator {
        TimingOperator::EndsDuring => FactDateMode::End,
        TimingOperator::Overlaps => FactDateMode::Overlap,
        _ => FactDateMode::Start,
    };

    let window = match constraint.operator {
        TimingOperator::During
        | TimingOperator::StartsDuring
        | TimingOperator::EndsDuring
        | TimingOperator::Overlaps => {
            let (mut start, mut end) = anchor_span(&constraint.anchor, ctx)?;
            if let Some(offset) = &constraint.offset {
                start = apply_offset(start, offset)?;
                end = apply_offset(end, offset)?;
            }
            ResolvedWindow::checked(Some(start), Some(end))?
        }
        TimingOperator::BeforeEndOf => {
            let point = anchor_point(&constraint.anchor, ctx)?;
            let point = match &constraint.offset {
                Some(offset) => apply_offset(point, offset)?,
                None => point,
            };
            ResolvedWindow {
                start: None,
                end: Some(point),
            }
        }
        TimingOperator::AfterStartOf => {
            let point = anchor_point(&constraint.anchor, ctx)?;
            let point = match &constraint.offset {
                Some(offset) => apply_offset(point, offset)?,
                None => point,
            };
            ResolvedWindow {
                start: Some(point),
                end: None,
            }
        }
        TimingOperator::Within => {
            let offset = constraint
                .offset
                .as_ref()
                .ok_or_else(|| ConfigurationError::missing_offset(constraint.operator.to_string()))?;
            let anchor = anchor_point(&constraint.anchor, ctx)?;
            let shifted = apply_offset(anchor, offset)?;
            match offset.direction {
                OffsetDirection::Before => ResolvedWindow::checked(Some(shifted), Some(anchor))?,
                OffsetDirection::After => ResolvedWindow::checked(Some(anchor), Some(shifted))?,
            }
        }
    };

    Ok(ResolvedTiming { window, mode })
}

fn resolve_window(window: &TimingWindow, ctx: &ResolutionContext) -> TimingResult<ResolvedTiming> {
    let start = resolve_boundary(&window.start, ctx)?;
    let end = resolve_boundary(&window.end, ctx)?;
    Ok(ResolvedTiming {
        window: ResolvedWindow::checked(Some(start), Some(end))?,
        mode: FactDateMode::Start,
    })
}

/// Resolve a timing requirement to a concrete window plus the fact-date
/// mode it is applied in
pub fn resolve_requirement(
    requirement: &TimingRequirement,
    ctx: &ResolutionContext,
) -> TimingResult<ResolvedTiming> {
    match requirement {
        TimingRequirement::Constraint(c) => resolve_constraint(c, ctx),
        TimingRequirement::Window(w) => resolve_window(w, ctx),
    }
}
