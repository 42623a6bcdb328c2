use tracing::debug;
use xot::Xot;

/// The `name` of every element with local name `param`, in document order.
///
/// Any namespace is accepted, so stylesheets that bind the XSLT namespace
/// to an unusual prefix still work. Text that isn't well-formed yields no
/// parameters.
pub fn extract_parameters(stylesheet: &str) -> Vec<String> {
    let mut xot = Xot::new();
    let root = match xot.parse(stylesheet) {
        Ok(root) => root,
        Err(e) => {
            debug!(error = %e, "cannot extract parameters from malformed stylesheet");
            return Vec::new();
        }
    };
    xot.descendants(root)
        .filter(|node| xot.is_element(*node) && xsltpad_xpath::local_name(&xot, *node) == "param")
        .filter_map(|node| xsltpad_xpath::attribute_value(&xot, node, "", "name"))
        .map(str::to_string)
        .collect()
}
