use unmeshedcore::{StepDefinition, StepType};

/// Local templates for building process definitions
pub struct StepTemplates;

impl StepTemplates {
    /// Default definition for a step type
    ///
    /// Name and ref are `default_<type>`, e.g. `default_noop`.
    pub fn default_step_definition(step_type: StepType, namespace: &str) -> StepDefinition {
        let name = format!("default_{}", step_type.as_str().to_ascii_lowercase());
        StepDefinition::new(name, step_type)
            .with_namespace(namespace)
            .with_description(format!("Default {} step", step_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_for_noop() {
        let step = StepTemplates::default_step_definition(StepType::Noop, "default");
        assert_eq!(step.name, "default_noop");
        assert_eq!(step.step_ref, "default_noop");
        assert_eq!(step.namespace, "default");
        assert_eq!(step.description.as_deref(), Some("Default NOOP step"));
        assert!(step.input.is_empty());
    }

    #[test]
    fn template_keeps_namespace() {
        let step = StepTemplates::default_step_definition(StepType::SubProcess, "billing");
        assert_eq!(step.name, "default_sub_process");
        assert_eq!(step.namespace, "billing");
    }
}
