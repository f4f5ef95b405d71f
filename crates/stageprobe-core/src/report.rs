//! Textual collision report and pass/fail verdict.

use std::io::{self, Write};

use crate::collision::{CollisionReport, HitDescriptor};

pub const DEFAULT_MAX_EXAMPLES: usize = 8;

/// Marker the verdict and section headings carry when a race was found.
pub const COLLISION_MARKER: &str = "Index collisions detected";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReportOptions {
    /// Descriptors printed per colliding offset before summarising the rest.
    pub max_examples: usize,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            max_examples: DEFAULT_MAX_EXAMPLES,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Clean { truncated: bool },
    Collisions,
}

impl Verdict {
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Clean { .. } => 0,
            Self::Collisions => 1,
        }
    }

    pub fn is_clean(&self) -> bool {
        matches!(self, Self::Clean { .. })
    }
}

pub fn verdict(report: &CollisionReport) -> Verdict {
    if report.has_collisions() {
        Verdict::Collisions
    } else {
        Verdict::Clean {
            truncated: report.truncated,
        }
    }
}

/// Print `report` and return its verdict.
pub fn write_report<W: Write>(
    report: &CollisionReport,
    options: &ReportOptions,
    out: &mut W,
) -> io::Result<Verdict> {
    if report.truncated {
        writeln!(
            out,
            "WARNING: per-lane capacity of {} elements exceeded by {} lane(s); results are incomplete",
            report.capacity,
            report.truncated_lanes.len()
        )?;
        writeln!(out, "WARNING: truncated lanes: {}", join_lanes(&report.truncated_lanes))?;
    }

    writeln!(out, "Total recorded elements: {}", report.total_elements)?;
    writeln!(out, "Recorded accesses: {}", report.recorded)?;
    writeln!(out, "Unique staging-region offsets: {}", report.unique_src_offsets())?;
    writeln!(out, "Unique private-buffer offsets: {}", report.unique_dst_offsets())?;

    write_space(out, "staging region", &report.src_collisions(), options)?;
    write_space(out, "private buffer", &report.dst_collisions(), options)?;

    let verdict = verdict(report);
    match verdict {
        Verdict::Collisions => writeln!(out, "FAIL: {}", COLLISION_MARKER)?,
        Verdict::Clean { truncated: false } => {
            writeln!(out, "PASS: No index collisions detected")?
        }
        Verdict::Clean { truncated: true } => writeln!(
            out,
            "PASS (incomplete): No index collisions detected among recorded accesses; capacity truncated the run"
        )?,
    }
    Ok(verdict)
}

fn write_space<W: Write>(
    out: &mut W,
    space: &str,
    collisions: &[(i64, &[HitDescriptor])],
    options: &ReportOptions,
) -> io::Result<()> {
    if collisions.is_empty() {
        return Ok(());
    }
    writeln!(
        out,
        "{} in {} ({} offsets):",
        COLLISION_MARKER,
        space,
        collisions.len()
    )?;
    for (offset, hits) in collisions {
        writeln!(out, "  offset {} hit {} times", offset, hits.len())?;
        for hit in hits.iter().take(options.max_examples) {
            writeln!(out, "    {}", hit)?;
        }
        if hits.len() > options.max_examples {
            writeln!(out, "    ... and {} more", hits.len() - options.max_examples)?;
        }
    }
    Ok(())
}

fn join_lanes(lanes: &[usize]) -> String {
    lanes
        .iter()
        .map(|lane| lane.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
