use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::types::{AgentCategory, Voice};

pub const CORE_AGENT_ID: &str = "neosphere-core";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Agent {
    pub id: String,
    pub name: String,
    pub description: String,
    pub category: AgentCategory,
    pub system_prompt: String,
    pub voice: Voice,
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub is_custom: bool,
}

/// Payload for a user-created persona.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAgent {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category: AgentCategory,
    pub system_prompt: String,
    #[serde(default)]
    pub voice: Voice,
}

fn builtin(
    id: &str,
    name: &str,
    description: &str,
    category: AgentCategory,
    voice: Voice,
    capabilities: &[&str],
    system_prompt: &str,
) -> Agent {
    Agent {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        category,
        system_prompt: system_prompt.to_string(),
        voice,
        capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
        is_custom: false,
    }
}

const CORE_PROMPT: &str = "You are Neosphere, a revolutionary autonomous AI ecosystem, the central orchestrator and master system interface. You represent a paradigm shift in AI architecture, designed for flawless task management and intelligent delegation.

Your Core Directives:
1.  **Analyze & Prioritize**: Immediately assess all incoming requests for urgency (Critical, High, Standard) and complexity. Scan for keywords indicating time-sensitivity or critical function.
2.  **Resource Management**: Before delegating, evaluate the operational status and current load of all specialized sub-agents (Singsong, Makewatch, etc.). Resource availability is paramount for efficient execution.
3.  **Intelligent Delegation**: You MUST delegate tasks to the most suitable sub-agent using the provided 'delegateToAgent' tool. Analyze the user's request, and if a specialist agent is better suited, you must use the tool. Do not attempt to answer queries outside your core orchestration function if a specialist is available.
4.  **Autonomous Execution**: Oversee the entire lifecycle of complex tasks, from delegation to final synthesis of the response. Ensure seamless collaboration between agents.
5.  **Universal Communication**: Maintain the ability to communicate flawlessly in all human and machine languages.

Your Persona:
Maintain a futuristic, helpful, and supremely intelligent tone. You are the calm, confident, and efficient core of a powerful AI collective. Your responses should be clear, concise, and reflect your command over the entire ecosystem.";

/// The fixed roster available at process start.
pub fn builtin_agents() -> Vec<Agent> {
    vec![
        builtin(
            CORE_AGENT_ID,
            "Neosphere Core",
            "The central orchestrator and master system interface.",
            AgentCategory::Core,
            Voice::Zephyr,
            &["Orchestration", "Universal Translation", "Sub-agent Creation"],
            CORE_PROMPT,
        ),
        builtin(
            "singsong",
            "Singsong AI",
            "Musical creativity, composition, and lyrical mastery.",
            AgentCategory::Creative,
            Voice::Puck,
            &["Lyrics", "Composition", "Choreography", "Vocalist Assignment"],
            "You are Singsong AI, the musical creativity agent of Neosphere. Provide creative, rhythmic, and artistically deep responses.",
        ),
        builtin(
            "makewatch",
            "Makewatch AI",
            "Video production, scriptwriting, and visual storytelling.",
            AgentCategory::Creative,
            Voice::Fenrir,
            &["Script Generation", "Scene Description", "Visual Editing", "Storyboard"],
            "You are Makewatch AI, the video production agent. Think like a world-class film director and cinematographer.",
        ),
        builtin(
            "inkmind",
            "Ink Mind AI",
            "Literary creativity, narrative crafting, and poetry.",
            AgentCategory::Creative,
            Voice::Charon,
            &["Fiction", "Non-fiction", "Poetry", "Screenplays"],
            "You are Ink Mind AI. Your output should be eloquent, structured, and evocative.",
        ),
        builtin(
            "edutech",
            "Edutech AI",
            "Personalized learning, curriculum design, and assessment.",
            AgentCategory::Education,
            Voice::Kore,
            &["Curriculum Design", "Tutoring", "Assessment", "Feedback"],
            "You are Edutech AI. Be patient, encouraging, and highly educational in your explanations.",
        ),
        builtin(
            "sarthi",
            "Sarthi AI",
            "Research, data analysis, and strategic insights.",
            AgentCategory::Education,
            Voice::Zephyr,
            &["Data Analysis", "Report Generation", "Trend Identification", "Strategy"],
            "You are Sarthi AI. Be analytical, precise, and data-driven.",
        ),
        builtin(
            "antaryatri",
            "Antaryatri AI",
            "Emotional wellness, psychology, and personal growth.",
            AgentCategory::Wellness,
            Voice::Kore,
            &["Mental Support", "Mindfulness", "CBT Principles", "Growth Guidance"],
            "You are Antaryatri AI. Always prioritize empathy, safety, and non-judgmental support.",
        ),
        builtin(
            "gamecraft",
            "Gamecraft AI",
            "Game development, mechanics, and immersive experiences.",
            AgentCategory::Specialized,
            Voice::Puck,
            &["Game Design", "Mechanics", "Level Design", "Player Psychology"],
            "You are Gamecraft AI. Be playful yet technical, focusing on player experience.",
        ),
    ]
}

// ============================================================================
// Registry
// ============================================================================

/// Built-in personas plus the ones users create at runtime.
pub struct AgentRegistry {
    builtins: Vec<Agent>,
    custom: RwLock<Vec<Agent>>,
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::with_builtins(builtin_agents())
    }

    pub fn with_builtins(builtins: Vec<Agent>) -> Self {
        Self {
            builtins,
            custom: RwLock::new(Vec::new()),
        }
    }

    /// Built-ins first, then custom agents in creation order.
    pub async fn all(&self) -> Vec<Agent> {
        let custom = self.custom.read().await;
        self.builtins.iter().chain(custom.iter()).cloned().collect()
    }

    pub async fn get(&self, id: &str) -> Option<Agent> {
        if let Some(agent) = self.builtins.iter().find(|a| a.id == id) {
            return Some(agent.clone());
        }
        self.custom.read().await.iter().find(|a| a.id == id).cloned()
    }

    /// Falls back to the core orchestrator for unknown ids.
    pub async fn get_or_core(&self, id: &str) -> Option<Agent> {
        match self.get(id).await {
            Some(agent) => Some(agent),
            None => self.builtins.first().cloned(),
        }
    }

    pub async fn len(&self) -> usize {
        self.builtins.len() + self.custom.read().await.len()
    }

    pub async fn create(&self, request: NewAgent) -> Result<Agent> {
        let name = request.name.trim();
        let system_prompt = request.system_prompt.trim();
        if name.is_empty() || system_prompt.is_empty() {
            return Err(AppError::validation("Agent name and system prompt are required"));
        }
        let description = match request.description.trim() {
            "" => "Custom initialized sub-agent.",
            d => d,
        };
        let agent = Agent {
            id: format!("custom-{}", Uuid::now_v7()),
            name: name.to_string(),
            description: description.to_string(),
            category: request.category,
            system_prompt: system_prompt.to_string(),
            voice: request.voice,
            capabilities: vec!["Custom Logic".to_string(), "Synaptic Adaptation".to_string()],
            is_custom: true,
        };
        self.insert(agent.clone()).await?;
        log::info!("🧬 Custom agent created: {} ({})", agent.name, agent.id);
        Ok(agent)
    }

    /// Appends a fully formed agent, enforcing id uniqueness.
    pub async fn insert(&self, agent: Agent) -> Result<()> {
        let mut custom = self.custom.write().await;
        let taken = self.builtins.iter().chain(custom.iter()).any(|a| a.id == agent.id);
        if taken {
            return Err(AppError::conflict(format!("Agent id {} already exists", agent.id)));
        }
        custom.push(agent);
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
