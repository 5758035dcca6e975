//! Composite system instruction for a turn.
//!
//! A turn's instruction is an ordered list of [`InstructionFragment`]s. Each
//! fragment renders on its own and [`compose`] joins them with a blank line,
//! so the same inputs always produce the same text.

use crate::agents::registry::Agent;
use crate::models::TrainingProtocol;

pub const DELEGATE_FUNCTION: &str = "delegateToAgent";

const FRAGMENT_SEPARATOR: &str = "\n\n";

#[derive(Debug, Clone, PartialEq)]
pub enum InstructionFragment<'a> {
    /// The acting persona's own prompt.
    Persona(&'a str),
    /// Language or style protocol the reply must follow.
    Protocol { name: &'a str, rules: &'a str },
    /// Other personas sharing the mission.
    Collaboration(Vec<&'a str>),
    /// Personas the model may hand the task to.
    Roster(&'a [Agent]),
}

impl InstructionFragment<'_> {
    pub fn render(&self) -> String {
        match self {
            Self::Persona(prompt) => prompt.to_string(),
            Self::Protocol { name, rules } => format!(
                "[NEURAL LINGUISTIC ADAPTATION ENABLED]\nTarget Language/Style: {}\nRules: {}\nRespond strictly adhering to this protocol.",
                name, rules
            ),
            Self::Collaboration(names) => format!(
                "[JOINT MISSION PROTOCOL ENABLED]\nCoordinate these personas: {}. Indicate contributions with [AgentName] tags.",
                names.join(", ")
            ),
            Self::Roster(delegates) => {
                let lines = delegates
                    .iter()
                    .map(|a| {
                        format!(
                            "- agentId: \"{}\", name: \"{}\", function: \"{}\"",
                            a.id, a.name, a.description
                        )
                    })
                    .collect::<Vec<_>>()
                    .join("\n");
                format!(
                    "[ECOSYSTEM CONTEXT]\nYou can delegate tasks to other agents if they are better suited. Use the '{}' function. Do not answer on behalf of other agents. Here are the available agents and their functions:\n{}",
                    DELEGATE_FUNCTION, lines
                )
            }
        }
    }
}

/// Fragments for one turn, in their fixed order. Optional fragments are only
/// present when they have content.
pub fn fragments<'a>(
    agent: &'a Agent,
    protocol: Option<&'a TrainingProtocol>,
    collaborators: &'a [Agent],
    delegates: &'a [Agent],
) -> Vec<InstructionFragment<'a>> {
    let mut out = vec![InstructionFragment::Persona(&agent.system_prompt)];

    if let Some(p) = protocol.filter(|p| p.is_active) {
        out.push(InstructionFragment::Protocol {
            name: &p.name,
            rules: &p.rules,
        });
    }

    if !collaborators.is_empty() {
        out.push(InstructionFragment::Collaboration(
            collaborators.iter().map(|a| a.name.as_str()).collect(),
        ));
    }

    if !delegates.is_empty() {
        out.push(InstructionFragment::Roster(delegates));
    }

    out
}

pub fn compose(fragments: &[InstructionFragment<'_>]) -> String {
    fragments
        .iter()
        .map(InstructionFragment::render)
        .collect::<Vec<_>>()
        .join(FRAGMENT_SEPARATOR)
}

pub fn with_question(instruction: &str, question: &str) -> String {
    format!("{}{}User Question: {}", instruction, FRAGMENT_SEPARATOR, question)
}

pub fn delegated_task(target: &Agent, origin: &Agent, task: &str) -> String {
    format!(
        "{}{}Task from {}: {}",
        target.system_prompt, FRAGMENT_SEPARATOR, origin.name, task
    )
}
