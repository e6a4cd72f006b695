use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "shadelive",
    author,
    version,
    about = "Live shader preview with hot reload and annotated uniforms"
)]
pub struct Cli {
    /// Shader source to render; falls back to `shader` in the config file.
    #[arg(value_name = "SHADER")]
    pub shader: Option<PathBuf>,

    /// Config file to read instead of `<config dir>/shadelive.toml`.
    #[arg(long, value_name = "FILE", env = "SHADELIVE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Initial window size (e.g. `1280x720`).
    #[arg(long, value_name = "WIDTHxHEIGHT", value_parser = parse_size)]
    pub size: Option<WindowSize>,

    /// Render passes on a dedicated thread instead of once per vsync.
    #[arg(long)]
    pub free_run: bool,

    /// Listen for OSC uniform messages on this UDP address (e.g. `127.0.0.1:9000`).
    #[arg(long, value_name = "ADDR")]
    pub osc_bind: Option<String>,

    /// OSC address prefix; `/PREFIX/<name>` sets the uniform `<name>`.
    #[arg(long, value_name = "PREFIX")]
    pub osc_prefix: Option<String>,

    /// File the uniform values persist to.
    #[arg(long, value_name = "FILE")]
    pub uniforms_file: Option<PathBuf>,

    /// Compiler command line, with `{input}` and `{output}` placeholders.
    /// A bare program name keeps the default arguments.
    #[arg(long, value_name = "COMMAND", value_parser = parse_command)]
    pub compiler: Option<CommandLine>,

    /// Preprocessor command line (`{input}`, `{depfile}`), or `none`.
    #[arg(long, value_name = "COMMAND", value_parser = parse_command)]
    pub preprocessor: Option<CommandLine>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSize {
    pub width: u32,
    pub height: u32,
}

/// A program followed by its arguments, split on whitespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    pub program: String,
    pub args: Vec<String>,
}

pub fn parse() -> Cli {
    Cli::parse()
}

pub fn parse_size(value: &str) -> Result<WindowSize, String> {
    let (w, h) = value
        .trim()
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("invalid size '{value}'; expected WIDTHxHEIGHT"))?;
    let width = w
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid width '{}'", w.trim()))?;
    let height = h
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid height '{}'", h.trim()))?;
    if width == 0 || height == 0 {
        return Err("window size must be greater than zero".into());
    }
    Ok(WindowSize { width, height })
}

pub fn parse_command(value: &str) -> Result<CommandLine, String> {
    let mut words = value.split_whitespace().map(str::to_string);
    let program = words
        .next()
        .ok_or_else(|| "command must not be empty".to_string())?;
    Ok(CommandLine {
        program,
        args: words.collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_window_sizes() {
        assert_eq!(
            parse_size("1280x720").unwrap(),
            WindowSize {
                width: 1280,
                height: 720
            }
        );
        assert_eq!(parse_size(" 64X32 ").unwrap().height, 32);
        assert!(parse_size("1280").is_err());
        assert!(parse_size("0x720").is_err());
        assert!(parse_size("wide x tall").is_err());
    }

    #[test]
    fn splits_command_lines() {
        let command = parse_command("glslc -fshader-stage=frag {input} -o {output}").unwrap();
        assert_eq!(command.program, "glslc");
        assert_eq!(
            command.args,
            ["-fshader-stage=frag", "{input}", "-o", "{output}"]
        );
        assert!(parse_command("slangc").unwrap().args.is_empty());
        assert!(parse_command("   ").is_err());
    }

    #[test]
    fn flags_map_onto_fields() {
        let cli = Cli::try_parse_from([
            "shadelive",
            "demo.slang",
            "--size",
            "320x200",
            "--free-run",
            "--osc-bind",
            "127.0.0.1:9000",
            "--preprocessor",
            "none",
        ])
        .unwrap();
        assert_eq!(cli.shader, Some(PathBuf::from("demo.slang")));
        assert_eq!(cli.size.map(|size| size.width), Some(320));
        assert!(cli.free_run);
        assert_eq!(cli.osc_bind.as_deref(), Some("127.0.0.1:9000"));
        assert_eq!(cli.preprocessor.map(|p| p.program).as_deref(), Some("none"));
        assert!(cli.compiler.is_none());
    }
}
