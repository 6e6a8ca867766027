//! Builder patterns for ergonomic construction of A2A types.

use crate::types::*;
use std::collections::HashMap;

/// Builder for constructing [`AgentCard`] with sensible defaults.
///
/// # Example
///
/// ```
/// use a2a_server::builders::AgentCardBuilder;
///
/// let card = AgentCardBuilder::new("Echo Agent", "Echoes messages back", "1.0.0")
///     .url("http://localhost:7420/a2a")
///     .with_skill("echo", "Echo", "Returns the input text", vec!["text".to_string()])
///     .with_streaming(true)
///     .with_push_notifications(true)
///     .build();
/// assert_eq!(card.preferred_transport.as_deref(), Some("JSONRPC"));
/// ```
#[derive(Debug, Clone)]
pub struct AgentCardBuilder {
    name: String,
    description: String,
    version: String,
    url: String,
    preferred_transport: Option<String>,
    skills: Vec<AgentSkill>,
    capabilities: AgentCapabilities,
    default_input_modes: Vec<String>,
    default_output_modes: Vec<String>,
    additional_interfaces: Option<Vec<AgentInterface>>,
    security: Option<Vec<HashMap<String, Vec<String>>>>,
    security_schemes: Option<HashMap<String, SecurityScheme>>,
    provider: Option<AgentProvider>,
    protocol_version: Option<String>,
    supports_authenticated_extended_card: Option<bool>,
    documentation_url: Option<String>,
    icon_url: Option<String>,
    metadata: Option<serde_json::Value>,
}

impl AgentCardBuilder {
    /// Create a new builder with the required identity fields.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            version: version.into(),
            url: String::new(),
            preferred_transport: Some("JSONRPC".to_string()),
            skills: Vec::new(),
            capabilities: AgentCapabilities::default(),
            default_input_modes: vec!["text/plain".to_string()],
            default_output_modes: vec!["text/plain".to_string()],
            additional_interfaces: None,
            security: None,
            security_schemes: None,
            provider: None,
            protocol_version: Some("0.3.0".to_string()),
            supports_authenticated_extended_card: None,
            documentation_url: None,
            icon_url: None,
            metadata: None,
        }
    }

    /// Set the agent's primary URL.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Set the preferred transport ("JSONRPC", "GRPC", "HTTP+JSON").
    pub fn preferred_transport(mut self, transport: impl Into<String>) -> Self {
        self.preferred_transport = Some(transport.into());
        self
    }

    /// Add a skill.
    pub fn with_skill(
        mut self,
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        tags: Vec<String>,
    ) -> Self {
        self.skills.push(AgentSkill {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            tags,
            examples: None,
            input_modes: None,
            output_modes: None,
        });
        self
    }

    /// Declare streaming support.
    pub fn with_streaming(mut self, enabled: bool) -> Self {
        self.capabilities.streaming = Some(enabled);
        self
    }

    /// Declare push notification support.
    pub fn with_push_notifications(mut self, enabled: bool) -> Self {
        self.capabilities.push_notifications = Some(enabled);
        self
    }

    /// Declare state transition history support.
    pub fn with_state_transition_history(mut self, enabled: bool) -> Self {
        self.capabilities.state_transition_history = Some(enabled);
        self
    }

    /// Set the accepted input MIME types.
    pub fn default_input_modes(mut self, modes: Vec<String>) -> Self {
        self.default_input_modes = modes;
        self
    }

    /// Set the produced output MIME types.
    pub fn default_output_modes(mut self, modes: Vec<String>) -> Self {
        self.default_output_modes = modes;
        self
    }

    /// Add an additional transport interface.
    pub fn with_interface(mut self, url: impl Into<String>, transport: impl Into<String>) -> Self {
        self.additional_interfaces
            .get_or_insert_with(Vec::new)
            .push(AgentInterface {
                url: url.into(),
                transport: transport.into(),
            });
        self
    }

    /// Set the provider organization.
    pub fn with_provider(
        mut self,
        organization: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        self.provider = Some(AgentProvider {
            organization: organization.into(),
            url: url.into(),
        });
        self
    }

    /// Register a named security scheme.
    pub fn with_security_scheme(mut self, name: impl Into<String>, scheme: SecurityScheme) -> Self {
        self.security_schemes
            .get_or_insert_with(HashMap::new)
            .insert(name.into(), scheme);
        self
    }

    /// Set the advertised protocol version.
    pub fn protocol_version(mut self, version: impl Into<String>) -> Self {
        self.protocol_version = Some(version.into());
        self
    }

    /// Advertise (or not) the authenticated extended card.
    pub fn supports_authenticated_extended_card(mut self, supported: bool) -> Self {
        self.supports_authenticated_extended_card = Some(supported);
        self
    }

    /// Set the documentation URL.
    pub fn documentation_url(mut self, url: impl Into<String>) -> Self {
        self.documentation_url = Some(url.into());
        self
    }

    /// Build the card.
    pub fn build(self) -> AgentCard {
        AgentCard {
            name: self.name,
            description: self.description,
            version: self.version,
            url: self.url,
            preferred_transport: self.preferred_transport,
            skills: self.skills,
            capabilities: self.capabilities,
            default_input_modes: self.default_input_modes,
            default_output_modes: self.default_output_modes,
            additional_interfaces: self.additional_interfaces,
            security: self.security,
            security_schemes: self.security_schemes,
            provider: self.provider,
            protocol_version: self.protocol_version,
            supports_authenticated_extended_card: self.supports_authenticated_extended_card,
            signatures: None,
            documentation_url: self.documentation_url,
            icon_url: self.icon_url,
            metadata: self.metadata,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_fills_defaults() {
        let card = AgentCardBuilder::new("A", "B", "1.0.0").build();
        assert_eq!(card.preferred_transport.as_deref(), Some("JSONRPC"));
        assert_eq!(card.default_input_modes, vec!["text/plain".to_string()]);
        assert_eq!(card.protocol_version.as_deref(), Some("0.3.0"));
        assert!(card.skills.is_empty());
    }

    #[test]
    fn builder_sets_capabilities_and_skills() {
        let card = AgentCardBuilder::new("A", "B", "1.0.0")
            .url("http://localhost:1/a2a")
            .with_streaming(true)
            .with_push_notifications(false)
            .with_skill("s1", "Skill", "Does things", vec!["tag".to_string()])
            .build();
        assert_eq!(card.capabilities.streaming, Some(true));
        assert_eq!(card.capabilities.push_notifications, Some(false));
        assert_eq!(card.skills.len(), 1);
        assert_eq!(card.skills[0].id, "s1");
    }

    #[test]
    fn builder_extended_card_flag() {
        let card = AgentCardBuilder::new("A", "B", "1.0.0")
            .supports_authenticated_extended_card(true)
            .build();
        assert_eq!(card.supports_authenticated_extended_card, Some(true));
    }
}
