//! Shell completion generation for docshift
//!
//! Bash, zsh and fish scripts get dynamic completion of datasource names for
//! `--source` and `--target`, read from `docshift config --list-datasources`.

use clap::CommandFactory;
use clap_complete::{Shell, generate};
use std::io::Write;

use crate::cli::CliArgs;
use crate::error::{ConfigError, Result};

/// Generate shell completion script
///
/// # Arguments
/// * `shell_name` - Shell type (bash, zsh, fish, powershell)
/// * `out` - Where to write the script
///
/// # Returns
/// * `Result<()>` - Success or error
pub fn generate_completion(shell_name: &str, out: &mut dyn Write) -> Result<()> {
    let shell = parse_shell(shell_name)?;

    let mut cmd = CliArgs::command();
    let mut buffer = Vec::new();
    generate(shell, &mut cmd, "docshift", &mut buffer);
    out.write_all(&buffer)?;

    let extra = match shell {
        Shell::Bash => BASH_DATASOURCES,
        Shell::Zsh => ZSH_DATASOURCES,
        Shell::Fish => FISH_DATASOURCES,
        _ => "",
    };
    out.write_all(extra.as_bytes())?;
    Ok(())
}

/// Parse shell name string to Shell enum
fn parse_shell(shell_name: &str) -> Result<Shell> {
    match shell_name.to_lowercase().as_str() {
        "bash" => Ok(Shell::Bash),
        "zsh" => Ok(Shell::Zsh),
        "fish" => Ok(Shell::Fish),
        "powershell" | "pwsh" => Ok(Shell::PowerShell),
        _ => Err(ConfigError::InvalidValue {
            field: "shell (bash, zsh, fish, powershell)".to_string(),
            value: shell_name.to_string(),
        }
        .into()),
    }
}

const BASH_DATASOURCES: &str = r#"
_docshift_datasources() {
    docshift config --list-datasources 2>/dev/null
}

_docshift_enhanced() {
    local cur prev
    cur="${COMP_WORDS[COMP_CWORD]}"
    prev="${COMP_WORDS[COMP_CWORD-1]}"

    if [[ "$prev" == "--source" || "$prev" == "--target" ]]; then
        COMPREPLY=($(compgen -W "$(_docshift_datasources)" -- "$cur"))
        return 0
    fi

    _docshift "$@"
}

complete -F _docshift_enhanced -o bashdefault -o default docshift
"#;

const ZSH_DATASOURCES: &str = r#"
_docshift_datasources() {
    local -a datasources
    datasources=(${(f)"$(docshift config --list-datasources 2>/dev/null)"})
    _describe 'datasources' datasources
}

_docshift_enhanced() {
    if [[ ${words[CURRENT-1]} == "--source" || ${words[CURRENT-1]} == "--target" ]]; then
        _docshift_datasources
        return 0
    fi
    _docshift "$@"
}

compdef _docshift_enhanced docshift
"#;

const FISH_DATASOURCES: &str = r#"
function __docshift_datasources
    docshift config --list-datasources 2>/dev/null
end

complete -c docshift -l source -f -a "(__docshift_datasources)" -d "Datasource name from config file"
complete -c docshift -l target -f -a "(__docshift_datasources)" -d "Datasource name from config file"
"#;
