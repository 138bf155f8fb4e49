//! Command-line interface for wxs

#[cfg(feature = "cli")]
use clap::{Parser, Subcommand, ValueEnum};

#[cfg(feature = "cli")]
use std::path::{Path, PathBuf};
#[cfg(feature = "cli")]
use std::process::ExitCode;

#[cfg(feature = "cli")]
use tracing_subscriber::EnvFilter;

#[cfg(feature = "cli")]
use wxs::namespaces::QName;
#[cfg(feature = "cli")]
use wxs::validators::{TypeKind, XmlPullReader};
#[cfg(feature = "cli")]
use wxs::{Diagnostic, Error, Schema, ValidationOptions, ValidationReport};

#[cfg(feature = "cli")]
#[derive(Parser, Debug)]
#[command(name = "wxs")]
#[command(author, version, about = "XML Schema 1.0 validation tool", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v, -vv, -vvv); RUST_LOG takes precedence
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[cfg(feature = "cli")]
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Format {
    Text,
    Json,
}

#[cfg(feature = "cli")]
#[derive(Subcommand, Debug)]
enum Commands {
    /// Inspect an XSD schema and display its global components
    Inspect {
        /// Path to the XSD schema file
        #[arg(value_name = "SCHEMA")]
        schema: PathBuf,

        /// Show details of a global element (local name or {ns}name)
        #[arg(short, long)]
        element: Option<String>,

        /// Show details of a global type (local name or {ns}name)
        #[arg(short = 't', long)]
        type_name: Option<String>,

        /// Show all elements
        #[arg(long)]
        elements: bool,

        /// Show all types
        #[arg(long)]
        types: bool,

        /// Show all attributes
        #[arg(long)]
        attributes: bool,

        /// Show all groups
        #[arg(long)]
        groups: bool,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Validate XML documents against an XSD schema
    Validate {
        /// Path to the XSD schema file
        #[arg(short, long, value_name = "SCHEMA")]
        schema: PathBuf,

        /// XML files to validate
        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,

        /// Disable ID/IDREF checking
        #[arg(long)]
        no_ids: bool,

        /// Print the identity-constraint tables of each document (JSON only)
        #[arg(long)]
        idc_tables: bool,
    },
}

#[cfg(feature = "cli")]
fn init_tracing(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(feature = "cli")]
fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    tracing::debug!("wxs v{} starting", wxs::VERSION);

    let result = match cli.command {
        Commands::Inspect {
            schema,
            element,
            type_name,
            elements,
            types,
            attributes,
            groups,
            json,
        } => cmd_inspect(schema, element, type_name, elements, types, attributes, groups, json),
        Commands::Validate {
            schema,
            files,
            format,
            no_ids,
            idc_tables,
        } => cmd_validate(schema, files, format, no_ids, idc_tables),
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(2)
        }
    }
}

/// Load a schema, printing its diagnostics when it is invalid
#[cfg(feature = "cli")]
fn load_schema(path: &Path) -> Result<Schema, Box<dyn std::error::Error>> {
    match Schema::parse_file(path) {
        Ok(schema) => {
            for warning in schema.warnings() {
                eprintln!("{}", warning);
            }
            Ok(schema)
        }
        Err(Error::InvalidSchema { error_count, diagnostics }) => {
            for diagnostic in &diagnostics {
                eprintln!("{}", diagnostic);
            }
            Err(format!("{}: invalid schema, {} error(s)", path.display(), error_count).into())
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(feature = "cli")]
fn cmd_validate(
    schema_path: PathBuf,
    files: Vec<PathBuf>,
    format: Format,
    no_ids: bool,
    idc_tables: bool,
) -> Result<u8, Box<dyn std::error::Error>> {
    let schema = load_schema(&schema_path)?;
    let options = ValidationOptions::new()
        .with_check_ids(!no_ids)
        .with_exposed_idc_node_tables(idc_tables);

    let mut failed = 0usize;
    let mut results = Vec::new();
    for file in &files {
        let outcome = validate_one(&schema, file, options.clone());
        let location = file.display().to_string();
        match (&outcome, format) {
            (Ok(report), Format::Text) => {
                print_diagnostics(&report.diagnostics);
                if report.is_valid() {
                    println!("{} validates", location);
                } else {
                    println!("{} fails to validate", location);
                }
            }
            (Err(e), Format::Text) => {
                eprintln!("{}: {}", location, e);
                println!("{} fails to validate", location);
            }
            (Ok(report), Format::Json) => {
                results.push(serde_json::json!({
                    "file": location,
                    "valid": report.is_valid(),
                    "code": report.code(),
                    "report": report,
                }));
            }
            (Err(e), Format::Json) => {
                results.push(serde_json::json!({
                    "file": location,
                    "valid": false,
                    "code": e.outcome_code(),
                    "error": e.to_string(),
                }));
            }
        }
        if !outcome.map(|r| r.is_valid()).unwrap_or(false) {
            failed += 1;
        }
    }

    if format == Format::Json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    }
    Ok(if failed == 0 { 0 } else { 1 })
}

#[cfg(feature = "cli")]
fn validate_one(schema: &Schema, path: &Path, options: ValidationOptions) -> wxs::Result<ValidationReport> {
    let text = std::fs::read_to_string(path)?;
    options.limits.check_xml_size(text.len())?;
    let location = path.display().to_string();
    let mut context = schema.validator(options);
    context.set_location(location.clone());
    let mut reader = XmlPullReader::new(&text).with_location(location);
    wxs::validators::validate_pull(&mut context, &mut reader)?;
    context.finish()
}

#[cfg(feature = "cli")]
fn print_diagnostics(diagnostics: &[Diagnostic]) {
    for diagnostic in diagnostics {
        eprintln!("{}", diagnostic);
    }
}

#[cfg(feature = "cli")]
#[allow(clippy::too_many_arguments)]
fn cmd_inspect(
    schema_path: PathBuf,
    element: Option<String>,
    type_name: Option<String>,
    show_elements: bool,
    show_types: bool,
    show_attributes: bool,
    show_groups: bool,
    json_output: bool,
) -> Result<u8, Box<dyn std::error::Error>> {
    let schema = load_schema(&schema_path)?;

    if let Some(name) = element {
        print_element_details(&schema, &name, json_output)?;
        return Ok(0);
    }
    if let Some(name) = type_name {
        print_type_details(&schema, &name, json_output)?;
        return Ok(0);
    }

    // If no specific flags, show summary
    let show_all = !show_elements && !show_types && !show_attributes && !show_groups;

    if json_output {
        print_schema_json(&schema, show_all || show_elements, show_all || show_types)?;
        return Ok(0);
    }

    print_schema_summary(&schema);
    let components = schema.components();

    if show_all || show_elements {
        println!("\n=== Global Elements ===");
        for (qname, decl) in schema.elements() {
            let type_str = decl
                .type_id()
                .map(|t| components[t].display_name())
                .unwrap_or_else(|| "anyType".to_string());
            println!("  {} : {}", qname, type_str);
        }
    }

    if show_all || show_types {
        println!("\n=== Global Types ===");
        for (qname, ty) in schema.types() {
            println!("  {} ({})", qname, type_kind(ty));
        }
    }

    if show_attributes {
        println!("\n=== Global Attributes ===");
        for (qname, _) in schema.attributes() {
            println!("  {}", qname);
        }
    }

    if show_groups {
        println!("\n=== Model Groups ===");
        for (qname, _) in schema.groups() {
            println!("  {}", qname);
        }

        println!("\n=== Attribute Groups ===");
        for (qname, _) in schema.attribute_groups() {
            println!("  {}", qname);
        }
    }

    Ok(0)
}

#[cfg(feature = "cli")]
fn type_kind(ty: &wxs::validators::TypeDef) -> &'static str {
    match ty.kind {
        TypeKind::Simple(_) => "simple",
        TypeKind::Complex(_) => "complex",
    }
}

#[cfg(feature = "cli")]
fn matches_name(qname: &QName, name: &str) -> bool {
    qname.local_name == name || qname.to_string() == name
}

#[cfg(feature = "cli")]
fn print_schema_summary(schema: &Schema) {
    let summary = schema.summary();
    println!("wxs v{}", wxs::VERSION);
    println!();
    println!("Schema Information:");
    match &summary.target_namespace {
        Some(ns) => println!("  Target Namespace: {}", ns),
        None => println!("  Target Namespace: (none)"),
    }
    println!("  Documents: {}", summary.documents.len());
    println!();
    println!("Statistics:");
    println!("  Global Elements: {}", summary.elements.len());
    println!("  Global Types: {}", summary.types.len());
    println!("  Global Attributes: {}", summary.attributes.len());
    println!("  Model Groups: {}", summary.groups.len());
    println!("  Attribute Groups: {}", summary.attribute_groups.len());
    println!("  Notations: {}", summary.notations.len());
    println!("  Identity Constraints: {}", summary.identity_constraints.len());
    if summary.warnings > 0 {
        println!("  Warnings: {}", summary.warnings);
    }
}

#[cfg(feature = "cli")]
fn print_schema_json(
    schema: &Schema,
    include_elements: bool,
    include_types: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    use serde_json::{json, Value};

    let components = schema.components();
    let mut output = json!({ "summary": schema.summary() });

    if include_elements {
        let elements: Vec<Value> = schema
            .elements()
            .map(|(qname, decl)| {
                json!({
                    "name": qname.to_string(),
                    "type": decl.type_id().map(|t| components[t].display_name()),
                    "nillable": decl.nillable,
                    "abstract": decl.is_abstract,
                })
            })
            .collect();
        output["elements"] = Value::Array(elements);
    }

    if include_types {
        let types: Vec<Value> = schema
            .types()
            .map(|(qname, ty)| {
                json!({
                    "name": qname.to_string(),
                    "kind": type_kind(ty),
                })
            })
            .collect();
        output["types"] = Value::Array(types);
    }

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

#[cfg(feature = "cli")]
fn print_element_details(schema: &Schema, name: &str, json_output: bool) -> Result<(), Box<dyn std::error::Error>> {
    let components = schema.components();
    let Some((qname, decl)) = schema.elements().find(|(qname, _)| matches_name(qname, name)) else {
        return Err(format!("Element '{}' not found in schema", name).into());
    };
    let type_name = decl.type_id().map(|t| components[t].display_name());
    let head = decl.head_id().map(|h| components[h].name.to_string());
    let members: Vec<String> = decl
        .substitution_members
        .iter()
        .map(|&m| components[m].name.to_string())
        .collect();
    let constraints: Vec<String> = decl
        .idcs
        .iter()
        .map(|&i| format!("{} {}", components[i].kind, components[i].name))
        .collect();

    if json_output {
        let json = serde_json::json!({
            "name": qname.to_string(),
            "localName": qname.local_name,
            "namespace": qname.namespace,
            "type": type_name,
            "nillable": decl.nillable,
            "abstract": decl.is_abstract,
            "substitutionGroup": head,
            "substitutionMembers": members,
            "identityConstraints": constraints,
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
    } else {
        println!("Element: {}", qname);
        println!("  Local Name: {}", qname.local_name);
        if let Some(ns) = &qname.namespace {
            println!("  Namespace: {}", ns);
        }
        if let Some(type_name) = &type_name {
            println!("  Type: {}", type_name);
        }
        println!("  Nillable: {}", decl.nillable);
        println!("  Abstract: {}", decl.is_abstract);
        if let Some(head) = &head {
            println!("  Substitution Group: {}", head);
        }
        if !members.is_empty() {
            println!("  Substitution Members: {}", members.join(", "));
        }
        for constraint in &constraints {
            println!("  Identity Constraint: {}", constraint);
        }
    }
    Ok(())
}

#[cfg(feature = "cli")]
fn print_type_details(schema: &Schema, name: &str, json_output: bool) -> Result<(), Box<dyn std::error::Error>> {
    let components = schema.components();
    let Some((qname, ty)) = schema.types().find(|(qname, _)| matches_name(qname, name)) else {
        return Err(format!("Type '{}' not found in schema", name).into());
    };
    let base = ty.base_id().map(|b| components[b].display_name());
    let content = match &ty.kind {
        TypeKind::Simple(st) => st.variety.to_string(),
        TypeKind::Complex(ct) => ct.content_type.to_string(),
    };
    let attributes: Vec<String> = ty
        .complex()
        .map(|ct| {
            ct.attribute_uses
                .iter()
                .filter_map(|&u| wxs::validators::attributes::use_name(components, u))
                .map(|n| n.to_string())
                .collect()
        })
        .unwrap_or_default();

    if json_output {
        let json = serde_json::json!({
            "name": qname.to_string(),
            "kind": type_kind(ty),
            "base": base,
            "derivation": ty.derivation.to_string(),
            "abstract": ty.is_abstract,
            "content": content,
            "attributes": attributes,
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
    } else {
        println!("Type: {} ({})", qname, type_kind(ty));
        if let Some(base) = &base {
            println!("  Base: {} by {}", base, ty.derivation);
        }
        println!("  Abstract: {}", ty.is_abstract);
        println!("  Content: {}", content);
        for attribute in &attributes {
            println!("  Attribute: {}", attribute);
        }
    }
    Ok(())
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("The wxs binary requires the 'cli' feature: cargo run --features cli");
    std::process::exit(1);
}
