use anyhow::{Context as _, Result};
use clap::{Parser, ValueEnum};
use vellum::{render_with, Context, Dialect, ErrorPolicy, RenderOptions};

/// Renders a template string against a JSON context and prints the HTML.
#[derive(Parser)]
#[command(name = "vellum", version, about = "Template-to-HTML converter")]
struct Args {
    /// Template text, e.g. "<div>{name}</div>" or "<div>{{ name }}</div>".
    template: String,

    /// Context as a JSON object, e.g. '{"name":"John"}'.
    #[arg(default_value = "{}")]
    context: String,

    /// Template dialect.
    #[arg(long, value_enum, default_value = "jsx")]
    dialect: DialectArg,

    /// Annotate failed expressions as HTML comments instead of dropping them.
    #[arg(long)]
    annotate_errors: bool,

    /// HTML-escape interpolated values.
    #[arg(long)]
    escape: bool,
}

#[derive(ValueEnum, Clone, Copy)]
enum DialectArg {
    /// JSX-like bracket syntax.
    Jsx,
    /// Vue-like brace syntax.
    Vue,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let value: serde_json::Value =
        serde_json::from_str(&args.context).context("context argument is not valid JSON")?;

    let dialect = match args.dialect {
        DialectArg::Jsx => Dialect::Bracket,
        DialectArg::Vue => Dialect::Brace,
    };
    let options = RenderOptions {
        error_policy: if args.annotate_errors {
            ErrorPolicy::Annotate
        } else {
            ErrorPolicy::Ignore
        },
        escape_interpolations: args.escape,
        ..RenderOptions::default()
    };

    let html = render_with(&args.template, &Context::new(value), dialect, &options)?;
    println!("{}", html);

    Ok(())
}
