//! Code-block language table: vendor language enum → Markdown fence tag.
//!
//! The vendor API identifies a code block's language either by name
//! (`"CPlusPlus"`) or by its numeric enum value (`9`). Both resolve through
//! the single table below; the numeric value of an entry is its 1-based
//! position in [`CODE_LANGUAGES`].
//!
//! Anything absent from the table renders as an untagged fence, which every
//! Markdown renderer displays as plain preformatted text.

/// `(vendor name, fence tag)` pairs, ordered by vendor enum value starting at 1.
pub const CODE_LANGUAGES: &[(&str, &str)] = &[
    ("PlainText", ""),
    ("ABAP", "abap"),
    ("Ada", "ada"),
    ("Apache", "apache"),
    ("Apex", "apex"),
    ("Assembly", "assembly"),
    ("Bash", "bash"),
    ("CSharp", "csharp"),
    ("CPlusPlus", "cpp"),
    ("C", "c"),
    ("COBOL", "cobol"),
    ("CSS", "css"),
    ("CoffeeScript", "coffeescript"),
    ("D", "d"),
    ("Dart", "dart"),
    ("Delphi", "delphi"),
    ("Django", "django"),
    ("Dockerfile", "dockerfile"),
    ("Erlang", "erlang"),
    ("Fortran", "fortran"),
    ("FoxPro", "foxpro"),
    ("Go", "go"),
    ("Groovy", "groovy"),
    ("HTML", "html"),
    ("HTMLBars", "htmlbars"),
    ("HTTP", "http"),
    ("Haskell", "haskell"),
    ("JSON", "json"),
    ("Java", "java"),
    ("JavaScript", "javascript"),
    ("Julia", "julia"),
    ("Kotlin", "kotlin"),
    ("LateX", "latex"),
    ("Lisp", "lisp"),
    ("Logo", "logo"),
    ("Lua", "lua"),
    ("MATLAB", "matlab"),
    ("Makefile", "makefile"),
    ("Markdown", "markdown"),
    ("Nginx", "nginx"),
    ("Objective", "objectivec"),
    ("OpenEdgeABL", "openedge-abl"),
    ("PHP", "php"),
    ("Perl", "perl"),
    ("PostScript", "postscript"),
    ("Power", "powershell"),
    ("Prolog", "prolog"),
    ("ProtoBuf", "protobuf"),
    ("Python", "python"),
    ("R", "r"),
    ("RPG", "rpg"),
    ("Ruby", "ruby"),
    ("Rust", "rust"),
    ("SAS", "sas"),
    ("SCSS", "scss"),
    ("SQL", "sql"),
    ("Scala", "scala"),
    ("Scheme", "scheme"),
    ("Scratch", "scratch"),
    ("Shell", "shell"),
    ("Swift", "swift"),
    ("Thrift", "thrift"),
    ("TypeScript", "typescript"),
    ("VBScript", "vbscript"),
    ("Visual", "vbnet"),
    ("XML", "xml"),
    ("YAML", "yaml"),
    ("CMake", "cmake"),
    ("Diff", "diff"),
    ("Gherkin", "gherkin"),
    ("GraphQL", "graphql"),
    ("OpenGLShadingLanguage", "glsl"),
    ("Properties", "properties"),
    ("Solidity", "solidity"),
    ("TOML", "toml"),
];

/// Fence tag for a vendor language name. Matching ignores ASCII case.
pub fn fence_tag(vendor_name: &str) -> &'static str {
    CODE_LANGUAGES
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(vendor_name))
        .map(|(_, tag)| *tag)
        .unwrap_or("")
}

/// Vendor language name for a numeric enum value.
pub fn name_for_code(code: u64) -> Option<&'static str> {
    let idx = usize::try_from(code).ok()?.checked_sub(1)?;
    CODE_LANGUAGES.get(idx).map(|(name, _)| *name)
}
