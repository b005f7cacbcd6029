//! Presentation of the live feedback panel
//!
//! Builds a render model from the aggregation state and the tutor gate, and
//! renders it as plain text (CLI) or a small HTML document (API).

use serde::{Deserialize, Serialize};

use crate::feedback::aggregate::{AggregateCounts, ReactionShare};
use crate::feedback::aggregator::LiveState;
use crate::feedback::reset::ResetReport;
use crate::types::{ClassId, Reaction};

/// One proportional bar
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bar {
    pub reaction: Reaction,
    pub count: u64,
    pub total: u64,
    pub percent: u8,
    pub variant: String,
    pub label: String,
}

impl From<ReactionShare> for Bar {
    fn from(share: ReactionShare) -> Self {
        Self {
            label: share.label(),
            variant: share.reaction.variant().to_string(),
            reaction: share.reaction,
            count: share.count,
            total: share.total,
            percent: share.percent,
        }
    }
}

/// Main area of the panel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "bars", rename_all = "snake_case")]
pub enum PanelBody {
    /// First snapshot not yet received
    Loading,
    Bars(Vec<Bar>),
    /// Live updates failed before any data arrived
    Unavailable,
}

/// Message shown above the bars
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    LiveUpdatesUnavailable { reason: String },
    SubmissionFailed { reason: String },
    ResetIncomplete { failed: usize, requested: usize },
    ResetComplete { deleted: usize },
}

impl Notice {
    pub fn from_reset(report: &ResetReport) -> Self {
        if report.is_complete() {
            Notice::ResetComplete {
                deleted: report.deleted,
            }
        } else {
            Notice::ResetIncomplete {
                failed: report.failed.len(),
                requested: report.requested,
            }
        }
    }

    pub fn message(&self) -> String {
        match self {
            Notice::LiveUpdatesUnavailable { reason } => {
                format!("Live updates unavailable ({}); results may be out of date", reason)
            }
            Notice::SubmissionFailed { reason } => format!("Failed to submit feedback: {}", reason),
            Notice::ResetIncomplete { failed, requested } => format!(
                "Reset incomplete: {} of {} responses could not be deleted",
                failed, requested
            ),
            Notice::ResetComplete { deleted } => format!("Reset {} responses", deleted),
        }
    }

    pub fn is_error(&self) -> bool {
        !matches!(self, Notice::ResetComplete { .. })
    }
}

/// Render model of the live feedback panel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackPanel {
    pub class_id: ClassId,
    /// Submission choices, in display order
    pub options: Vec<Reaction>,
    pub body: PanelBody,
    /// Bars show the last known tally, not a live one
    pub stale: bool,
    pub notices: Vec<Notice>,
    /// Reset control is shown only to users with elevated access
    pub reset_available: bool,
}

impl FeedbackPanel {
    pub fn build(class_id: ClassId, state: &LiveState, can_reset: bool) -> Self {
        let (body, stale, notices) = match state {
            LiveState::Loading => (PanelBody::Loading, false, Vec::new()),
            LiveState::Live { counts, .. } => (bars(counts), false, Vec::new()),
            LiveState::Degraded { last, reason } => {
                let notice = Notice::LiveUpdatesUnavailable {
                    reason: reason.clone(),
                };
                match last {
                    Some(counts) => (bars(counts), true, vec![notice]),
                    None => (PanelBody::Unavailable, false, vec![notice]),
                }
            }
        };

        Self {
            class_id,
            options: Reaction::ALL.to_vec(),
            body,
            stale,
            notices,
            reset_available: can_reset,
        }
    }

    pub fn with_notice(mut self, notice: Notice) -> Self {
        self.notices.push(notice);
        self
    }

    /// Plain-text rendering for terminals
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("Live feedback: {}\n", self.class_id));
        out.push_str(&format!(
            "Submit feedback: {}\n\n",
            self.options
                .iter()
                .map(|r| r.as_str())
                .collect::<Vec<_>>()
                .join(" | ")
        ));

        for notice in &self.notices {
            let marker = if notice.is_error() { "!" } else { "*" };
            out.push_str(&format!("{} {}\n", marker, notice.message()));
        }

        match &self.body {
            PanelBody::Loading => out.push_str("Loading...\n"),
            PanelBody::Unavailable => out.push_str("No results available\n"),
            PanelBody::Bars(bars) => {
                for bar in bars {
                    let filled = (bar.percent as usize * 40) / 100;
                    out.push_str(&format!(
                        "{:<10} [{}{}] {:>3}%\n",
                        bar.reaction.as_str(),
                        "#".repeat(filled),
                        " ".repeat(40 - filled),
                        bar.percent
                    ));
                    out.push_str(&format!("           {}\n", bar.label));
                }
                if self.stale {
                    out.push_str("(stale)\n");
                }
            }
        }

        if self.reset_available {
            out.push_str("\n[Reset responses]\n");
        }

        out
    }

    /// Standalone HTML rendering
    pub fn render_html(&self) -> String {
        let mut html = String::new();
        html.push_str("<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\">");
        html.push_str(&format!(
            "<title>Live feedback: {}</title></head><body>\n",
            escape_html(self.class_id.as_str())
        ));

        html.push_str(&format!(
            "<form method=\"post\" action=\"/classes/{}/live\">\n",
            escape_html(self.class_id.as_str())
        ));
        for option in &self.options {
            html.push_str(&format!(
                "<button name=\"reaction\" value=\"{0}\">{0}</button>\n",
                option.as_str()
            ));
        }
        html.push_str("</form>\n");

        for notice in &self.notices {
            let class = if notice.is_error() { "alert-danger" } else { "alert-success" };
            html.push_str(&format!(
                "<div class=\"alert {}\">{}</div>\n",
                class,
                escape_html(&notice.message())
            ));
        }

        match &self.body {
            PanelBody::Loading => {
                html.push_str("<div class=\"spinner\" role=\"status\">Loading...</div>\n")
            }
            PanelBody::Unavailable => {
                html.push_str("<div class=\"unavailable\">No results available</div>\n")
            }
            PanelBody::Bars(bars) => {
                for bar in bars {
                    html.push_str(&format!(
                        "<div class=\"progress bg-{variant}{stale}\" style=\"width: {pct}%\">{pct}%</div>\n",
                        variant = bar.variant,
                        stale = if self.stale { " stale" } else { "" },
                        pct = bar.percent
                    ));
                    html.push_str(&format!(
                        "<div>{} out of {} find the lecture <strong>{}</strong></div>\n",
                        bar.count,
                        bar.total,
                        bar.reaction.as_str()
                    ));
                }
            }
        }

        if self.reset_available {
            html.push_str(&format!(
                "<form method=\"post\" action=\"/classes/{}/live/reset\"><button>Reset responses</button></form>\n",
                escape_html(self.class_id.as_str())
            ));
        }

        html.push_str("</body></html>\n");
        html
    }
}

fn bars(counts: &AggregateCounts) -> PanelBody {
    PanelBody::Bars(counts.breakdown().into_iter().map(Bar::from).collect())
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
