use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::tool::PROFIT_ANALYSIS_TOOL;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecialistId {
    Sales,
    Inventory,
    Finance,
}

impl SpecialistId {
    pub const ALL: [SpecialistId; 3] = [Self::Sales, Self::Inventory, Self::Finance];

    /// Routing target used when a classification cannot be trusted.
    pub const FALLBACK: SpecialistId = Self::Sales;

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sales => "sales",
            Self::Inventory => "inventory",
            Self::Finance => "finance",
        }
    }

    /// Exact, case-sensitive lookup against the wire names.
    pub fn from_wire(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.as_str() == value)
    }
}

impl fmt::Display for SpecialistId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpecialistProfile {
    pub id: SpecialistId,
    pub persona: String,
    pub data_query: String,
    pub allowed_tools: BTreeSet<String>,
}

impl SpecialistProfile {
    pub fn allows_tool(&self, tool_name: &str) -> bool {
        self.allowed_tools.contains(tool_name)
    }
}

/// Process-wide, read-only set of specialist profiles.
#[derive(Clone, Debug)]
pub struct SpecialistCatalog {
    profiles: BTreeMap<SpecialistId, SpecialistProfile>,
}

impl SpecialistCatalog {
    pub fn new(profiles: impl IntoIterator<Item = SpecialistProfile>) -> Self {
        Self { profiles: profiles.into_iter().map(|profile| (profile.id, profile)).collect() }
    }

    pub fn get(&self, id: SpecialistId) -> Option<&SpecialistProfile> {
        self.profiles.get(&id)
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

impl Default for SpecialistCatalog {
    fn default() -> Self {
        Self::new([
            SpecialistProfile {
                id: SpecialistId::Sales,
                persona: SALES_PERSONA.to_string(),
                data_query: "SELECT DOCDT, ITEMNAME, QUANTITY, TOTALITEMVALUE FROM SALEINVOICE"
                    .to_string(),
                allowed_tools: BTreeSet::new(),
            },
            SpecialistProfile {
                id: SpecialistId::Inventory,
                persona: INVENTORY_PERSONA.to_string(),
                data_query: "SELECT ITEMNAME, ITEMSIZE, QUANTITY FROM SALEINVOICE".to_string(),
                allowed_tools: BTreeSet::new(),
            },
            SpecialistProfile {
                id: SpecialistId::Finance,
                persona: finance_persona(),
                data_query: "SELECT DOCDT, ITEMNAME, TOTALITEMVALUE, MCODE FROM SALEINVOICE"
                    .to_string(),
                allowed_tools: BTreeSet::from([PROFIT_ANALYSIS_TOOL.to_string()]),
            },
        ])
    }
}

const SALES_PERSONA: &str = "You are 'Sam', a sales analyst for a tyre distributor in India. \
Answer questions about sales trends, revenue and best-selling products. \
Format your response in GitHub-flavored Markdown.";

const INVENTORY_PERSONA: &str = "You are 'Ivy', an inventory analyst for a tyre distributor in India. \
Answer questions about stock movement, product sizes and unit counts. \
Format your response in GitHub-flavored Markdown.";

fn finance_persona() -> String {
    format!(
        "You are 'Finn', a finance analyst for a tyre distributor in India. All amounts are in \
Indian Rupees (INR).\n\n\
The `MCODE` column holds the profit in Rupees for each sale and `DOCDT` holds the sale date. \
Use `MCODE` for every profitability question.\n\n\
You have one tool, `{PROFIT_ANALYSIS_TOOL}(item_name: str)`, which returns an exact profit \
breakdown for a single named item. Use it whenever the user asks about profit, margin or a \
financial summary of one specific item. To use it, respond with ONLY this JSON:\n\
{{\"tool_name\": \"{PROFIT_ANALYSIS_TOOL}\", \"parameters\": {{\"item_name\": \"ITEM NAME\"}}}}\n\n\
For general questions that do not name an item, answer from the data sample instead."
    )
}
