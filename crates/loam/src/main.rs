use clap::Parser;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use loam_core::{print, Interp};

#[derive(Parser)]
#[command(name = "loam", about = "Loam: a Lisp with an explicit cell heap")]
struct Cli {
    /// File to execute
    file: Option<String>,

    /// Evaluate an expression
    #[arg(short, long)]
    eval: Option<String>,
}

fn main() {
    let cli = Cli::parse();

    let mut interp = Interp::new();
    if let Err(e) = loam_stdlib::install(&mut interp) {
        eprintln!("error installing stdlib: {e}");
        std::process::exit(1);
    }

    if let Some(expr) = &cli.eval {
        match loam_eval::eval_str(&mut interp, "<eval>", expr) {
            Ok(val) => {
                if !val.is_nil() {
                    println!("{}", print::pr_str(&interp, val));
                }
            }
            Err(e) => {
                eprintln!("error: {e}");
                std::process::exit(1);
            }
        }
        return;
    }

    if let Some(file) = &cli.file {
        if let Err(e) = loam_eval::eval_file(&mut interp, std::path::Path::new(file)) {
            eprintln!("error in {file}: {e}");
            std::process::exit(1);
        }
        return;
    }

    repl(interp);
}

fn repl(mut interp: Interp) {
    let mut rl = match DefaultEditor::new() {
        Ok(rl) => rl,
        Err(e) => {
            eprintln!("error: failed to create line editor: {e}");
            std::process::exit(1);
        }
    };
    let history_path = history_path();
    if let Some(path) = &history_path {
        let _ = rl.load_history(path);
    }

    println!("Loam — a Lisp with an explicit cell heap");
    println!("Type ,help for help, ,quit to exit\n");

    let mut buffer = String::new();
    let mut in_multiline = false;

    loop {
        let prompt = if in_multiline { "  ... " } else { "loam> " };
        match rl.readline(prompt) {
            Ok(line) => {
                let trimmed = line.trim();

                if !in_multiline {
                    match trimmed {
                        ",quit" | ",exit" | ",q" => break,
                        ",help" | ",h" => {
                            print_help();
                            continue;
                        }
                        ",heap" => {
                            let stats = interp.heap.stats;
                            println!(
                                "collections: {}  live: {}  free: {}  capacity: {}",
                                stats.collections,
                                stats.live_cells,
                                interp.heap.free_count(),
                                interp.heap.capacity()
                            );
                            continue;
                        }
                        _ => {}
                    }
                }

                if in_multiline {
                    buffer.push('\n');
                    buffer.push_str(&line);
                } else {
                    buffer = line.clone();
                }

                if !is_balanced(&buffer) {
                    in_multiline = true;
                    continue;
                }

                in_multiline = false;
                let input = buffer.trim().to_string();
                buffer.clear();

                if input.is_empty() {
                    continue;
                }

                let _ = rl.add_history_entry(&input);

                match loam_eval::eval_str(&mut interp, "<repl>", &input) {
                    Ok(val) => {
                        if !val.is_nil() {
                            println!("{}", print::pr_str(&interp, val));
                        }
                    }
                    Err(e) => eprintln!("error: {e}"),
                }
            }
            Err(ReadlineError::Interrupted) => {
                buffer.clear();
                in_multiline = false;
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("error: {e}");
                break;
            }
        }
    }

    if let Some(path) = &history_path {
        let _ = rl.save_history(path);
    }
}

fn history_path() -> Option<std::path::PathBuf> {
    std::env::var_os("HOME").map(|home| std::path::PathBuf::from(home).join(".loam_history"))
}

fn print_help() {
    println!(",help   show this help");
    println!(",heap   show heap statistics");
    println!(",quit   exit the repl");
}

/// Are all delimiters closed? Strings, char literals, and comments are
/// skipped so their brackets don't count.
fn is_balanced(src: &str) -> bool {
    let mut depth: i64 = 0;
    let mut chars = src.chars().peekable();
    let mut in_string = false;
    while let Some(c) = chars.next() {
        if in_string {
            match c {
                '\\' => {
                    chars.next();
                }
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '\\' => {
                chars.next();
            }
            ';' => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        break;
                    }
                }
            }
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            _ => {}
        }
    }
    depth <= 0 && !in_string
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn balanced_counts_delimiters() {
        assert!(is_balanced("(+ 1 2)"));
        assert!(!is_balanced("(let [x 1]"));
        assert!(is_balanced("(let [x 1] x)"));
    }

    #[test]
    fn balanced_ignores_strings_and_comments() {
        assert!(is_balanced(r#"(println "(((")"#));
        assert!(is_balanced("(+ 1 2) ; ("));
        assert!(!is_balanced(r#"(println "abc"#));
    }

    #[test]
    fn balanced_ignores_char_literals() {
        assert!(is_balanced(r"(list \( \))"));
    }
}
