/// Compile a regex once and hand out a `&'static Regex`.
#[macro_export]
macro_rules! regex {
    ($pat:literal) => {{
        static RE: ::once_cell::sync::Lazy<::regex::Regex> =
            ::once_cell::sync::Lazy::new(|| ::regex::Regex::new($pat).unwrap());
        &*RE
    }};
}

/// Build a [`MorphRule`](crate::MorphRule) from named fields.
///
/// `id` and `label` come first; every other field is optional and defaults to
/// [`MorphRule::new`](crate::MorphRule::new). `entry` takes a regex literal,
/// the template and label fields take anything string-like.
///
/// ```
/// use morphosearch::{morph_rule, MorphBase, SandhiGroup};
///
/// let rule = morph_rule! {
///     id: 2,
///     label: "",
///     entry: r"^(.+)\+(.+)$",
///     left: "$1",
///     right: "$2",
///     sandhi_group: SandhiGroup::BOTH,
///     base: MorphBase::Both,
///     rating: 0.8,
/// };
/// assert_eq!(rule.right.as_deref(), Some("$2"));
/// ```
#[macro_export]
macro_rules! morph_rule {
    (
        id: $id:expr,
        label: $label:expr
        $(, $field:ident : $value:expr)*
        $(,)?
    ) => {{
        #[allow(unused_mut)]
        let mut rule = $crate::MorphRule::new($id, $label);
        $( $crate::morph_rule!(@set rule, $field, $value); )*
        rule
    }};
    (@set $rule:ident, entry, $value:expr) => {
        $rule.entry = Some(::regex::Regex::new($value).unwrap())
    };
    (@set $rule:ident, left, $value:expr) => {
        $rule.left = Some(($value).to_string())
    };
    (@set $rule:ident, right, $value:expr) => {
        $rule.right = Some(($value).to_string())
    };
    (@set $rule:ident, left_label, $value:expr) => {
        $rule.left_label = ($value).to_string()
    };
    (@set $rule:ident, right_label, $value:expr) => {
        $rule.right_label = ($value).to_string()
    };
    (@set $rule:ident, $field:ident, $value:expr) => {
        $rule.$field = $value
    };
}

#[cfg(test)]
mod tests {
    use crate::{MorphBase, SandhiGroup};

    fn boundary() -> &'static ::regex::Regex {
        regex!(r"^(.+)\+(.+)$")
    }

    #[test]
    fn regex_is_compiled_once_per_call_site() {
        assert!(std::ptr::eq(boundary(), boundary()));
        assert!(boundary().is_match("deva+indra"));
    }

    #[test]
    fn morph_rule_sets_pattern_and_sides() {
        let rule = morph_rule! {
            id: 2,
            label: "",
            entry: r"^(.+)\+(.+)$",
            left: "$1",
            right: "$2",
            sandhi_group: SandhiGroup::BOTH,
            base: MorphBase::Both,
        };
        let pattern = rule.entry.as_ref().map(|re| re.as_str());
        assert_eq!(pattern, Some(r"^(.+)\+(.+)$"));
        assert_eq!((rule.left.as_deref(), rule.right.as_deref()), (Some("$1"), Some("$2")));
        assert_eq!(rule.base, MorphBase::Both);
    }
}
