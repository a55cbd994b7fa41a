//! crates/intern_tracker_core/src/catalog.rs
//!
//! The fixed competency catalog that logs, artifacts, and progress refer to.

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Competency {
    pub id: &'static str,
    pub category: &'static str,
    pub title: &'static str,
    pub description: &'static str,
}

const fn competency(
    id: &'static str,
    category: &'static str,
    title: &'static str,
    description: &'static str,
) -> Competency {
    Competency { id, category, title, description }
}

const CORE: &str = "Core Leadership";
const PRINCIPAL: &str = "Principal";
const OUTCOMES: &str = "Outcomes";

pub static ALL_COMPETENCIES: &[Competency] = &[
    competency("A", CORE, "Leadership", "General leadership competencies for all Minnesota licenses."),
    competency("A1", CORE, "Culture of Engagement", "Collaboratively assessing and improving culture of engagement, ethical/equitable practice, and systems perspective."),
    competency("A2", CORE, "Educational Mission", "Collaboratively developing a shared educational mission for school/district."),
    competency("A3", CORE, "Decision-making", "Shared leadership and decision-making strategies."),
    competency("A4", CORE, "External Impacts", "Understand how education is impacted by local, state, and global issues."),
    competency("A5", CORE, "Strategic Planning", "Formulate strategic plans and goals."),
    competency("B", CORE, "Organizational Management", "Managing organizational systems, data, and resources."),
    competency("B1", CORE, "Org Systems", "Understanding structural and cultural dynamics."),
    competency("B2", CORE, "Data Processes", "Processes for gathering, analyzing, and using data."),
    competency("B5", CORE, "Budgets", "Develop and manage budgets and accurate fiscal records."),
    competency("C", CORE, "Equity & Responsive Leadership", "Ensuring fair treatment and understanding of diverse cultures."),
    competency("C5", CORE, "Bias Identification", "Recognize, identify, and address individual and institutional biases."),
    competency("D", CORE, "Policy & Law", "Understanding state, federal, and constitutional provisions."),
    competency("E", CORE, "Political Influence", "Governance models and stakeholder involvement."),
    competency("F", CORE, "Communication", "Facilitation, conflict resolution, and public speaking."),
    competency("G", CORE, "Community Relations", "Engagement with the extended community and generating a positive image."),
    competency("H", CORE, "Curriculum & Assessment", "Coherent systems for student success."),
    competency("I", CORE, "Human Resources", "Recruiting, selecting, and retaining personnel."),
    competency("J", CORE, "Values & Ethics", "Role of education in a democratic society."),
    competency("K", CORE, "Judgment & Analysis", "Problem analysis and reaching logical conclusions."),
    competency("L", CORE, "Safety & Security", "Policies for safe and secure environments."),
    competency("P_A", PRINCIPAL, "Instructional Leadership", "Supporting staff in implementation of standards."),
    competency("P_B", PRINCIPAL, "Monitor Student Learning", "Fostering a community of learners."),
    competency("P_C", PRINCIPAL, "PK-12 Leadership", "Understanding organizational systems across all levels."),
    competency("O1", OUTCOMES, "License Proficiency", "Display proficiency of MN administrative license competencies."),
    competency("O2", OUTCOMES, "Personal Formation", "Practice reflection and sustained personal formation."),
    competency("O3", OUTCOMES, "Strategic Thinking", "Apply strategic and collaborative thinking to issues."),
    competency("O4", OUTCOMES, "Faith & Ethics", "Integrate faith, values, and ethics in leadership."),
    competency("O5", OUTCOMES, "Diversity & Equity", "Demonstrate leadership in areas of diversity, inclusion, and equity."),
    competency("O6", OUTCOMES, "Academic Research", "Demonstrate strong academic writing and research abilities."),
];

pub fn find(id: &str) -> Option<&'static Competency> {
    ALL_COMPETENCIES.iter().find(|c| c.id == id)
}

pub fn is_known(id: &str) -> bool {
    find(id).is_some()
}
