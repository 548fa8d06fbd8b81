//! Domain values handed to the core by its collaborators: attendee records,
//! placement rectangles and badge roles.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Badge role. Each role may have its own template and placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// General role; also the fallback for templates and placements.
    Attendee,
    Speaker,
    Staff,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::Attendee, Role::Speaker, Role::Staff];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Attendee => "attendee",
            Role::Speaker => "speaker",
            Role::Staff => "staff",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "attendee" => Ok(Role::Attendee),
            "speaker" => Ok(Role::Speaker),
            "staff" => Ok(Role::Staff),
            other => Err(format!("unknown role '{other}' (expected attendee, speaker or staff)")),
        }
    }
}

/// Ticket-type labels that map a record onto the staff or speaker role.
///
/// Staff labels are checked first, so a label present in both sets resolves
/// to [`Role::Staff`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleLabels {
    pub staff: Vec<String>,
    pub speaker: Vec<String>,
}

impl Default for RoleLabels {
    fn default() -> Self {
        Self {
            staff: vec!["Helpers".to_string()],
            speaker: vec!["Speakers".to_string()],
        }
    }
}

impl RoleLabels {
    /// Resolve a ticket type to a role. Labels match after trimming; the
    /// comparison is case-sensitive. Anything unmatched is an attendee.
    pub fn resolve(&self, ticket_type: &str) -> Role {
        let ticket_type = ticket_type.trim();
        let matches = |labels: &[String]| labels.iter().any(|l| l.trim() == ticket_type);
        if ticket_type.is_empty() {
            Role::Attendee
        } else if matches(&self.staff) {
            Role::Staff
        } else if matches(&self.speaker) {
            Role::Speaker
        } else {
            Role::Attendee
        }
    }
}

/// Where the QR goes on the template page, in PDF points.
///
/// Origin is the bottom-left of the page; `(x, y)` is the QR's bottom-left
/// corner and `size` is both its width and height.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlacementRect {
    pub x: f32,
    pub y: f32,
    pub size: f32,
}

impl PlacementRect {
    pub fn new(x: f32, y: f32, size: f32) -> Self {
        Self { x, y, size }
    }

    /// Top edge of the QR, where the text band starts.
    pub fn top(&self) -> f32 {
        self.y + self.size
    }

    pub fn is_valid(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.size.is_finite() && self.size > 0.0
    }
}

/// One normalised attendee row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendeeRecord {
    /// Unique within a run; becomes the QR payload and the output file name.
    pub id: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub ticket_type: String,
    #[serde(default)]
    pub company: Option<String>,
}

impl AttendeeRecord {
    pub fn new(
        id: impl Into<String>,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        ticket_type: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            first_name: first_name.into(),
            last_name: last_name.into(),
            ticket_type: ticket_type.into(),
            company: None,
        }
    }

    pub fn with_company(mut self, company: impl Into<String>) -> Self {
        self.company = Some(company.into());
        self
    }

    /// Text lines this record puts on its badge.
    pub fn badge_text(&self) -> BadgeText {
        BadgeText {
            first_name: self.first_name.trim().to_string(),
            last_name: self.last_name.trim().to_string(),
            company: self.company.as_deref().and_then(clean_company),
        }
    }
}

/// Name and company text as it will be laid out on a badge.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BadgeText {
    pub first_name: String,
    pub last_name: String,
    /// Already filtered: never blank or a null-like placeholder.
    pub company: Option<String>,
}

/// Drop blank and null-like placeholders that spreadsheet exports leave in
/// empty company cells.
pub fn clean_company(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    match trimmed.to_ascii_lowercase().as_str() {
        "" | "nan" | "none" | "null" => None,
        _ => Some(trimmed.to_string()),
    }
}
