//! Error taxonomy for blueprint compilation.
//!
//! Every failure carries a stable numeric code (see [`CompileError::code`])
//! and, where one exists, the name of the offending element instance.
//! Callers branch on the code, never on the message text.
//!
//! Code ranges:
//! - 1xx: schema-API errors (the element declarations themselves are broken)
//! - 2xx: format errors (document shape mismatches)
//! - 3xx: logic errors (cross-reference failures)
//! - 4xx: cycle errors

/// Compilation result type
pub type CompileResult<T> = Result<T, CompileError>;

/// Compilation error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    /// Element-type declaration is malformed (a programming error, not a
    /// document error)
    #[error("invalid element schema: {reason}")]
    SchemaApi {
        /// What is wrong with the declaration
        reason: String,
    },

    /// Value does not match the declared shape or scalar kind
    #[error("'{element}': expected {expected}, got {actual}")]
    UnexpectedType {
        /// Offending element instance
        element: String,
        /// Expected shape/kind
        expected: String,
        /// Actual shape/kind
        actual: String,
    },

    /// Required field is absent
    #[error("'{element}': missing required field '{field}'")]
    MissingRequiredField {
        /// Element owning the mapping
        element: String,
        /// The missing key
        field: String,
    },

    /// Strict mode rejected a key not declared in the schema
    #[error("'{element}': field '{field}' is not in the schema")]
    UndeclaredField {
        /// Element owning the mapping
        element: String,
        /// The undeclared key
        field: String,
    },

    /// None of the schema alternatives matched the value
    #[error("'{element}': value matches none of the allowed forms")]
    NoMatchingAlternative {
        /// Offending element instance
        element: String,
    },

    /// Duplicate entry where uniqueness is required
    #[error("'{element}': duplicate entry '{entry}'")]
    DuplicateEntry {
        /// Element owning the collection
        element: String,
        /// The repeated entry
        entry: String,
    },

    /// Document could not be loaded into a nested mapping
    #[error("invalid document: {reason}")]
    InvalidDocument {
        /// What the loader rejected
        reason: String,
    },

    /// Reference to a type that is not declared
    #[error("'{element}': unknown type '{type_name}'")]
    UnknownType {
        /// Referencing element
        element: String,
        /// The unresolved type name
        type_name: String,
    },

    /// Operation or workflow names a plugin that is not declared
    #[error("'{element}': unknown plugin '{plugin}'")]
    UnknownPlugin {
        /// Referencing element
        element: String,
        /// The unresolved plugin name
        plugin: String,
    },

    /// Relationship targets a node template that does not exist
    #[error("'{element}': unknown relationship target '{target}'")]
    UnknownTarget {
        /// Referencing element
        element: String,
        /// The unresolved template name
        target: String,
    },

    /// Group policy names a policy type that is not declared
    #[error("'{element}': unknown policy type '{policy_type}'")]
    UnknownPolicyType {
        /// Referencing element
        element: String,
        /// The unresolved policy type
        policy_type: String,
    },

    /// Group policy trigger names a trigger that is not declared
    #[error("'{element}': unknown policy trigger '{trigger}'")]
    UnknownPolicyTrigger {
        /// Referencing element
        element: String,
        /// The unresolved trigger name
        trigger: String,
    },

    /// Group member names a node template that does not exist
    #[error("'{element}': unknown group member '{member}'")]
    UnknownGroupMember {
        /// Referencing element
        element: String,
        /// The unresolved member name
        member: String,
    },

    /// Executor value is neither `central` nor `host`
    #[error("'{element}': illegal executor '{value}'")]
    IllegalExecutor {
        /// Referencing element
        element: String,
        /// The rejected value
        value: String,
    },

    /// Operation input declared mandatory by the schema was not supplied
    #[error("'{element}': operation input '{input}' is mandatory")]
    MissingOperationInput {
        /// Element owning the operation
        element: String,
        /// The missing input name
        input: String,
    },

    /// Operation input not present in the overridden input schema
    #[error("'{element}': operation input '{input}' is not declared")]
    UndeclaredOperationInput {
        /// Element owning the operation
        element: String,
        /// The undeclared input name
        input: String,
    },

    /// Imported document declares a different DSL version than the main one
    #[error("import '{import}' declares version {imported}, main document declares {main}")]
    VersionMismatch {
        /// The import location
        import: String,
        /// Main document version string
        main: String,
        /// Imported document version string
        imported: String,
    },

    /// Two documents declare the same key in a merged section
    #[error("import '{import}': '{section}/{key}' already defined")]
    ImportCollision {
        /// The import location
        import: String,
        /// Colliding section
        section: String,
        /// Colliding key
        key: String,
    },

    /// Import location could not be resolved or fetched
    #[error("import '{import}' could not be resolved")]
    UnresolvedImport {
        /// The import location
        import: String,
    },

    /// Required requirement produced no candidates
    #[error("'{element}': requirement '{requirement}' could not be satisfied")]
    MissingRequirement {
        /// Dependent element
        element: String,
        /// Requirement name
        requirement: String,
    },

    /// Single-valued requirement produced more than one candidate
    #[error("'{element}': requirement '{requirement}' matched more than one candidate")]
    AmbiguousRequirement {
        /// Dependent element
        element: String,
        /// Requirement name
        requirement: String,
    },

    /// Template omits a property the type declares without a default
    #[error("'{element}': property '{property}' is required and has no default")]
    MissingRequiredProperty {
        /// Element owning the properties
        element: String,
        /// The missing property
        property: String,
    },

    /// Template sets a property the type does not declare
    #[error("'{element}': property '{property}' is not declared by the type")]
    UndeclaredProperty {
        /// Element owning the properties
        element: String,
        /// The undeclared property
        property: String,
    },

    /// Version declarator could not be parsed
    #[error("invalid DSL version '{value}'")]
    InvalidVersion {
        /// The rejected declarator
        value: String,
    },

    /// Dependency cycle among element instances
    #[error("dependency cycle: {}", names.join(" -> "))]
    DependencyCycle {
        /// Participating instance names in order, closing repeat included
        names: Vec<String>,
    },
}

impl CompileError {
    /// Stable numeric code for this error.
    ///
    /// Codes are part of the public contract and never change meaning.
    #[must_use]
    pub fn code(&self) -> u16 {
        match self {
            Self::SchemaApi { .. } => 101,
            Self::UnexpectedType { .. } => 201,
            Self::MissingRequiredField { .. } => 202,
            Self::UndeclaredField { .. } => 203,
            Self::NoMatchingAlternative { .. } => 204,
            Self::DuplicateEntry { .. } => 205,
            Self::InvalidDocument { .. } => 206,
            Self::UnknownType { .. } => 301,
            Self::UnknownPlugin { .. } => 302,
            Self::UnknownTarget { .. } => 303,
            Self::UnknownPolicyType { .. } => 304,
            Self::UnknownPolicyTrigger { .. } => 305,
            Self::UnknownGroupMember { .. } => 306,
            Self::IllegalExecutor { .. } => 307,
            Self::MissingOperationInput { .. } => 308,
            Self::UndeclaredOperationInput { .. } => 309,
            Self::VersionMismatch { .. } => 310,
            Self::ImportCollision { .. } => 311,
            Self::UnresolvedImport { .. } => 312,
            Self::MissingRequirement { .. } => 313,
            Self::AmbiguousRequirement { .. } => 314,
            Self::MissingRequiredProperty { .. } => 315,
            Self::UndeclaredProperty { .. } => 316,
            Self::InvalidVersion { .. } => 317,
            Self::DependencyCycle { .. } => 401,
        }
    }

    /// The offending element instance name, when the error has one.
    #[must_use]
    pub fn element(&self) -> Option<&str> {
        match self {
            Self::UnexpectedType { element, .. }
            | Self::MissingRequiredField { element, .. }
            | Self::UndeclaredField { element, .. }
            | Self::NoMatchingAlternative { element }
            | Self::DuplicateEntry { element, .. }
            | Self::UnknownType { element, .. }
            | Self::UnknownPlugin { element, .. }
            | Self::UnknownTarget { element, .. }
            | Self::UnknownPolicyType { element, .. }
            | Self::UnknownPolicyTrigger { element, .. }
            | Self::UnknownGroupMember { element, .. }
            | Self::IllegalExecutor { element, .. }
            | Self::MissingOperationInput { element, .. }
            | Self::UndeclaredOperationInput { element, .. }
            | Self::MissingRequirement { element, .. }
            | Self::AmbiguousRequirement { element, .. }
            | Self::MissingRequiredProperty { element, .. }
            | Self::UndeclaredProperty { element, .. } => Some(element),
            _ => None,
        }
    }

    /// True for 2xx codes.
    #[must_use]
    pub fn is_format(&self) -> bool {
        (200..300).contains(&self.code())
    }

    /// True for 3xx codes.
    #[must_use]
    pub fn is_logic(&self) -> bool {
        (300..400).contains(&self.code())
    }
}
