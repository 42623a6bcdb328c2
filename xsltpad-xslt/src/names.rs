use strum_macros::{EnumString, VariantNames};

pub(crate) const XSL_NAMESPACE: &str = "http://www.w3.org/1999/XSL/Transform";

/// XSLT elements that may appear in a template body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, VariantNames)]
#[strum(serialize_all = "kebab-case")]
pub(crate) enum InstructionName {
    ApplyImports,
    ApplyTemplates,
    Attribute,
    CallTemplate,
    Choose,
    Comment,
    Copy,
    CopyOf,
    Element,
    Fallback,
    ForEach,
    If,
    Message,
    Number,
    ProcessingInstruction,
    Text,
    ValueOf,
    Variable,
}

/// XSLT elements that may appear at the top level of a stylesheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, VariantNames)]
#[strum(serialize_all = "kebab-case")]
pub(crate) enum DeclarationName {
    AttributeSet,
    DecimalFormat,
    Import,
    Include,
    Key,
    NamespaceAlias,
    Output,
    Param,
    PreserveSpace,
    StripSpace,
    Template,
    Variable,
}

/// Functions XSLT adds to the XPath core library.
pub(crate) const XSLT_FUNCTIONS: [&str; 9] = [
    "current",
    "document",
    "element-available",
    "format-number",
    "function-available",
    "generate-id",
    "key",
    "system-property",
    "unparsed-entity-uri",
];

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use strum::VariantNames;

    use super::*;

    #[test]
    fn test_kebab_case_names() {
        assert_eq!(
            InstructionName::from_str("for-each"),
            Ok(InstructionName::ForEach)
        );
        assert_eq!(
            InstructionName::from_str("processing-instruction"),
            Ok(InstructionName::ProcessingInstruction)
        );
        assert!(InstructionName::from_str("sort").is_err());
        assert!(DeclarationName::VARIANTS.contains(&"namespace-alias"));
    }
}
