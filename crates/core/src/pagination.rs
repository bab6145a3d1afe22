//! Work queue filtering, FIFO ordering and page slicing.
//!
//! Listings filter the reconciled views first, then sort oldest first, then slice. The
//! filter only looks at the derived stage and status; it never goes back to the store.

use crate::reconcile::{DonorStageView, Stage, StageStatus};
use chrono::{DateTime, NaiveDate, Utc};
use std::num::NonZeroUsize;

/// Status filter for the donor work queue (`?status=`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkQueueFilter {
    #[default]
    All,
    /// Pending donors not yet seen by a physician.
    Incoming,
    /// Pending donors with the physician or phlebotomist.
    Active,
    /// Donors whose queue timestamp falls on the current day.
    Today,
    Pending,
    Completed,
    Deferred,
    AtStage(Stage),
}

impl WorkQueueFilter {
    /// Parses a `?status=` value. Absent or unknown values mean no filtering.
    pub fn parse(value: Option<&str>) -> Self {
        let Some(raw) = value.map(str::trim).filter(|v| !v.is_empty()) else {
            return WorkQueueFilter::All;
        };
        match raw.to_ascii_lowercase().as_str() {
            "all" => WorkQueueFilter::All,
            "incoming" => WorkQueueFilter::Incoming,
            "active" => WorkQueueFilter::Active,
            "today" => WorkQueueFilter::Today,
            "pending" => WorkQueueFilter::Pending,
            "completed" => WorkQueueFilter::Completed,
            "deferred" => WorkQueueFilter::Deferred,
            other => match other.parse::<Stage>() {
                Ok(stage) => WorkQueueFilter::AtStage(stage),
                Err(_) => {
                    tracing::warn!("unknown status filter {:?}, showing all donors", raw);
                    WorkQueueFilter::All
                }
            },
        }
    }

    pub fn matches(&self, view: &DonorStageView, today: NaiveDate) -> bool {
        match self {
            WorkQueueFilter::All => true,
            WorkQueueFilter::Incoming => {
                view.status == StageStatus::Pending && view.current_stage <= Stage::Reviewer
            }
            WorkQueueFilter::Active => {
                view.status == StageStatus::Pending && view.current_stage >= Stage::Physician
            }
            WorkQueueFilter::Today => view
                .sort_timestamp
                .is_some_and(|ts| ts.date_naive() == today),
            WorkQueueFilter::Pending => view.status == StageStatus::Pending,
            WorkQueueFilter::Completed => view.status == StageStatus::Completed,
            WorkQueueFilter::Deferred => view.status == StageStatus::Deferred,
            WorkQueueFilter::AtStage(stage) => view.current_stage == *stage,
        }
    }
}

/// Case-insensitive match on donor id or any name part.
pub fn matches_search(view: &DonorStageView, term: &str) -> bool {
    let term = term.trim().to_lowercase();
    if term.is_empty() {
        return true;
    }
    if view.donor_id.to_lowercase() == term {
        return true;
    }
    [&view.surname, &view.first_name, &view.middle_name]
        .into_iter()
        .flatten()
        .any(|part| part.to_lowercase().contains(&term))
        || view.full_name().to_lowercase().contains(&term)
}

/// Stable oldest-first sort by `key`; rows without a timestamp go last.
pub fn sort_fifo_by<T>(items: &mut [T], key: impl Fn(&T) -> Option<DateTime<Utc>>) {
    items.sort_by(|a, b| match (key(a), key(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
}

/// 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: usize,
    pub per_page: NonZeroUsize,
}

impl PageRequest {
    /// Page numbers below 1 (or absent) mean the first page.
    pub fn new(page: Option<usize>, per_page: NonZeroUsize) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            per_page,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Page actually returned, after clamping to `1..=total_pages`.
    pub page: usize,
    pub per_page: usize,
    pub total_records: usize,
    /// At least 1, even when there are no records.
    pub total_pages: usize,
}

impl<T> Page<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            page: self.page,
            per_page: self.per_page,
            total_records: self.total_records,
            total_pages: self.total_pages,
        }
    }
}

/// Slices `items` into the requested page. A page past the end returns the last page.
pub fn paginate<T>(items: Vec<T>, request: PageRequest) -> Page<T> {
    let per_page = request.per_page.get();
    let total_records = items.len();
    let total_pages = total_records.div_ceil(per_page).max(1);
    let page = request.page.clamp(1, total_pages);

    let items = items
        .into_iter()
        .skip((page - 1) * per_page)
        .take(per_page)
        .collect();

    Page {
        items,
        page,
        per_page,
        total_records,
        total_pages,
    }
}

/// Filter, search, FIFO sort and paginate reconciled views.
pub fn work_queue(
    views: Vec<DonorStageView>,
    filter: WorkQueueFilter,
    search: Option<&str>,
    today: NaiveDate,
    request: PageRequest,
) -> Page<DonorStageView> {
    let mut selected: Vec<DonorStageView> = views
        .into_iter()
        .filter(|v| filter.matches(v, today))
        .filter(|v| search.map_or(true, |term| matches_search(v, term)))
        .collect();
    sort_fifo_by(&mut selected, |v| v.sort_timestamp);
    paginate(selected, request)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn view(id: &str, stage: Stage, status: StageStatus, day: Option<u32>) -> DonorStageView {
        DonorStageView {
            donor_id: id.into(),
            surname: Some(format!("Surname{id}")),
            first_name: Some("Jo".into()),
            middle_name: None,
            birthdate: None,
            age: None,
            submitted_at: None,
            blood_type: None,
            donation_type: None,
            current_stage: stage,
            status,
            deferral_reason: None,
            donation_count: 1,
            sort_timestamp: day.map(|d| Utc.with_ymd_and_hms(2024, 5, d, 8, 0, 0).unwrap()),
        }
    }

    fn per(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn filter_parsing_accepts_stages_and_falls_back_to_all() {
        assert_eq!(WorkQueueFilter::parse(None), WorkQueueFilter::All);
        assert_eq!(WorkQueueFilter::parse(Some("Incoming")), WorkQueueFilter::Incoming);
        assert_eq!(
            WorkQueueFilter::parse(Some("physician")),
            WorkQueueFilter::AtStage(Stage::Physician)
        );
        assert_eq!(WorkQueueFilter::parse(Some("bogus")), WorkQueueFilter::All);
    }

    #[test]
    fn incoming_and_active_split_pending_donors() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 3).unwrap();
        let reviewer = view("1", Stage::Reviewer, StageStatus::Pending, Some(1));
        let physician = view("2", Stage::Physician, StageStatus::Pending, Some(1));
        let deferred = view("3", Stage::Reviewer, StageStatus::Deferred, Some(3));

        assert!(WorkQueueFilter::Incoming.matches(&reviewer, today));
        assert!(!WorkQueueFilter::Incoming.matches(&physician, today));
        assert!(WorkQueueFilter::Active.matches(&physician, today));
        assert!(!WorkQueueFilter::Active.matches(&deferred, today));
        assert!(!WorkQueueFilter::Incoming.matches(&deferred, today));
        assert!(WorkQueueFilter::Today.matches(&deferred, today));
        assert!(!WorkQueueFilter::Today.matches(&reviewer, today));
    }

    #[test]
    fn fifo_sort_is_stable_with_missing_timestamps_last() {
        let mut views = vec![
            view("a", Stage::Staff, StageStatus::Pending, None),
            view("b", Stage::Staff, StageStatus::Pending, Some(5)),
            view("c", Stage::Staff, StageStatus::Pending, Some(2)),
            view("d", Stage::Staff, StageStatus::Pending, Some(5)),
            view("e", Stage::Staff, StageStatus::Pending, None),
        ];
        sort_fifo_by(&mut views, |v| v.sort_timestamp);
        let ids: Vec<&str> = views.iter().map(|v| v.donor_id.as_str()).collect();
        assert_eq!(ids, ["c", "b", "d", "a", "e"]);
    }

    #[test]
    fn concatenated_pages_reproduce_the_list_for_every_page_size() {
        let items: Vec<usize> = (0..23).collect();
        for size in 1..=30 {
            let first = paginate(items.clone(), PageRequest::new(None, per(size)));
            let mut seen = Vec::new();
            for page in 1..=first.total_pages {
                seen.extend(paginate(items.clone(), PageRequest::new(Some(page), per(size))).items);
            }
            assert_eq!(seen, items, "page size {size}");
        }
    }

    #[test]
    fn out_of_range_pages_are_clamped() {
        let items: Vec<usize> = (0..20).collect();
        let last = paginate(items.clone(), PageRequest::new(Some(99), per(15)));
        assert_eq!(last.page, 2);
        assert_eq!(last.items, (15..20).collect::<Vec<_>>());
        assert_eq!(last.total_pages, 2);

        let first = paginate(items, PageRequest::new(Some(0), per(15)));
        assert_eq!(first.page, 1);
    }

    #[test]
    fn empty_list_has_one_empty_page() {
        let page = paginate(Vec::<u8>::new(), PageRequest::new(Some(3), per(15)));
        assert_eq!(page.page, 1);
        assert_eq!(page.total_pages, 1);
        assert_eq!(page.total_records, 0);
        assert!(page.items.is_empty());
    }

    #[test]
    fn work_queue_filters_before_paginating() {
        let today = NaiveDate::from_ymd_opt(2024, 5, 30).unwrap();
        let views: Vec<DonorStageView> = (1..=20)
            .map(|i| {
                let status = if i % 2 == 0 {
                    StageStatus::Deferred
                } else {
                    StageStatus::Pending
                };
                view(&i.to_string(), Stage::Reviewer, status, Some(21 - i as u32))
            })
            .collect();

        let page = work_queue(
            views,
            WorkQueueFilter::Deferred,
            None,
            today,
            PageRequest::new(Some(1), per(4)),
        );
        assert_eq!(page.total_records, 10);
        assert_eq!(page.total_pages, 3);
        let ids: Vec<&str> = page.items.iter().map(|v| v.donor_id.as_str()).collect();
        assert_eq!(ids, ["20", "18", "16", "14"]);
    }

    #[test]
    fn search_matches_names_and_exact_ids() {
        let v = view("42", Stage::Staff, StageStatus::Pending, None);
        assert!(matches_search(&v, "surname4"));
        assert!(matches_search(&v, "42"));
        assert!(matches_search(&v, "  "));
        assert!(!matches_search(&v, "4"));
        assert!(!matches_search(&v, "zzz"));
    }
}
