//! Side-by-side placement of overlapping calendar entries.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutEvent {
    pub id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl LayoutEvent {
    pub fn new(id: impl Into<String>, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            start,
            end,
        }
    }

    fn overlaps(&self, other: &LayoutEvent) -> bool {
        self.start < other.end && other.start < self.end
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LayoutSlot {
    pub width_percent: f64,
    pub left_percent: f64,
}

pub fn compute_layout(events: &[LayoutEvent]) -> HashMap<String, LayoutSlot> {
    let mut layout = HashMap::with_capacity(events.len());
    for cluster in overlap_clusters(events) {
        let columns = assign_columns(cluster);
        let width = 100.0 / columns.len() as f64;
        for (column_index, column) in columns.iter().enumerate() {
            for event in column {
                layout.insert(
                    event.id.clone(),
                    LayoutSlot {
                        width_percent: width,
                        left_percent: column_index as f64 * width,
                    },
                );
            }
        }
    }
    layout
}

/// Groups events connected by a chain of pairwise overlaps. Members of each
/// cluster stay in input order.
fn overlap_clusters(events: &[LayoutEvent]) -> Vec<Vec<&LayoutEvent>> {
    let mut assigned = vec![false; events.len()];
    let mut clusters = Vec::new();

    for seed in 0..events.len() {
        if assigned[seed] {
            continue;
        }
        assigned[seed] = true;
        let mut members = vec![seed];

        let mut grew = true;
        while grew {
            grew = false;
            for candidate in 0..events.len() {
                if assigned[candidate] {
                    continue;
                }
                if members
                    .iter()
                    .any(|&member| events[member].overlaps(&events[candidate]))
                {
                    assigned[candidate] = true;
                    members.push(candidate);
                    grew = true;
                }
            }
        }

        members.sort_unstable();
        clusters.push(members.into_iter().map(|index| &events[index]).collect());
    }
    clusters
}

fn assign_columns(mut cluster: Vec<&LayoutEvent>) -> Vec<Vec<&LayoutEvent>> {
    // Stable: equal starts keep input order.
    cluster.sort_by(|left, right| left.start.cmp(&right.start));

    let mut columns: Vec<Vec<&LayoutEvent>> = Vec::new();
    for event in cluster {
        let free_column = columns
            .iter_mut()
            .find(|column| column.iter().all(|placed| !placed.overlaps(event)));
        match free_column {
            Some(column) => column.push(event),
            None => columns.push(vec![event]),
        }
    }
    columns
}
