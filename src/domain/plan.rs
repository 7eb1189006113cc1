//! The production plan produced by the planning stage.

use serde::{Deserialize, Serialize};

/// Two sub-prompts and the reasoning behind them.
///
/// Created once per run and never modified afterwards; the image stage
/// consumes `visual_prompt`, the video stage `motion_prompt`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    /// Detailed prompt for the still image
    pub visual_prompt: String,

    /// Camera and subject movement instructions for the video
    pub motion_prompt: String,

    /// Short explanation of the creative direction
    pub reasoning: String,
}

impl Plan {
    /// Build a plan, rejecting any blank field.
    ///
    /// On failure the wire name of the first blank field is returned.
    pub fn try_new(
        visual_prompt: impl Into<String>,
        motion_prompt: impl Into<String>,
        reasoning: impl Into<String>,
    ) -> Result<Self, &'static str> {
        let plan = Self {
            visual_prompt: visual_prompt.into(),
            motion_prompt: motion_prompt.into(),
            reasoning: reasoning.into(),
        };

        if let Some(field) = plan.first_blank_field() {
            return Err(field);
        }
        Ok(plan)
    }

    /// Name of the first field that is empty or whitespace only
    pub fn first_blank_field(&self) -> Option<&'static str> {
        [
            ("visualPrompt", &self.visual_prompt),
            ("motionPrompt", &self.motion_prompt),
            ("reasoning", &self.reasoning),
        ]
        .into_iter()
        .find(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
    }
}
