mod class_path;

use class_path::ClassPath;
use clap::{command, value_parser, Arg, ArgAction};
use jverify::jvm::class_file::ClassFile;
use jverify::jvm::class_graph::{ClassGraph, ClassGraphArenas};
use jverify::jvm::verifier::{verify_with_settings, FailureKind, Settings, VerifiableMethod};
use std::io;
use std::io::Write;
use std::path::PathBuf;
use std::process::exit;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};
use walkdir::WalkDir;

fn main() -> io::Result<()> {
    env_logger::init();

    let matches = command!()
        .about("Verify the bytecode of methods in JVM class files")
        .arg(
            Arg::new("class-path")
                .long("class-path")
                .value_name("DIRECTORY")
                .action(ArgAction::Append)
                .value_parser(value_parser!(PathBuf))
                .help("Directory to load referenced classes from (can be repeated)"),
        )
        .arg(
            Arg::new("no-fallback")
                .long("no-fallback")
                .action(ArgAction::SetTrue)
                .help("Don't retry version 50 methods without their stack map table"),
        )
        .arg(
            Arg::new("java8-arrays")
                .long("java8-arrays")
                .action(ArgAction::SetTrue)
                .help("Treat `boolean[]` as `byte[]`, like Java 8 and earlier"),
        )
        .arg(
            Arg::new("INPUT")
                .help("Class files or directories of class files to verify")
                .required(true)
                .num_args(1..)
                .value_parser(value_parser!(PathBuf)),
        )
        .get_matches();

    let settings = Settings {
        allow_fallback: !matches.get_flag("no-fallback"),
        boolean_arrays_distinct: !matches.get_flag("java8-arrays"),
    };

    let inputs: Vec<PathBuf> = matches
        .get_many::<PathBuf>("INPUT")
        .into_iter()
        .flatten()
        .cloned()
        .collect();

    // Input directories double as class path roots
    let mut roots: Vec<PathBuf> = matches
        .get_many::<PathBuf>("class-path")
        .into_iter()
        .flatten()
        .cloned()
        .collect();
    roots.extend(inputs.iter().filter(|input| input.is_dir()).cloned());

    // Find all of the class files
    let class_files: Vec<PathBuf> = inputs
        .into_iter()
        .flat_map(|input| {
            if input.is_file() {
                vec![input]
            } else {
                WalkDir::new(input)
                    .follow_links(true)
                    .into_iter()
                    .filter_map(|e| e.ok())
                    .map(|e| e.into_path())
                    .filter(|e| e.is_file() && e.extension().map_or(false, |ex| ex == "class"))
                    .collect()
            }
        })
        .collect();

    let class_graph_arenas = ClassGraphArenas::new();
    let class_graph = ClassGraph::new(&class_graph_arenas);
    class_graph.insert_java_library_types();
    let class_path = ClassPath::new(&class_graph, roots);

    let mut count_fail = 0;
    let stdout = StandardStream::stdout(ColorChoice::Auto);
    for path in class_files {
        log::info!("Reading '{}'", path.display());
        let loaded = ClassFile::load_from_path(&path).and_then(|class_file| {
            let class = class_path.add_class_file(&class_file)?;
            Ok((class_file, class))
        });
        let (class_file, class) = match loaded {
            Ok(loaded) => loaded,
            Err(err) => {
                count_fail += 1;
                log::error!("{}: {}", path.display(), err);
                report(&stdout, &path.to_string_lossy(), Color::Yellow, b"ERROR")?;
                continue;
            }
        };
        let methods = match VerifiableMethod::all_in(&class_file, class) {
            Ok(methods) => methods,
            Err(err) => {
                count_fail += 1;
                log::error!("{}: {}", path.display(), err);
                report(&stdout, &path.to_string_lossy(), Color::Yellow, b"ERROR")?;
                continue;
            }
        };

        for method in methods {
            let (color, summary): (Color, &[u8]) =
                match verify_with_settings(&class_path, &method, &settings) {
                    Ok(()) => (Color::Green, b"OK".as_ref()),
                    Err(failure) => {
                        count_fail += 1;
                        log::error!("{}: {}", method, failure);
                        match failure.kind {
                            FailureKind::ClassFormat => (Color::Red, b"FAILED (format)".as_ref()),
                            FailureKind::Verify => (Color::Red, b"FAILED (verify)".as_ref()),
                        }
                    }
                };
            report(&stdout, &method.to_string(), color, summary)?;
        }
    }

    exit(if count_fail > 0 { 1 } else { 0 })
}

/// Print ` - <subject> [<summary>]`
fn report(stdout: &StandardStream, subject: &str, color: Color, summary: &[u8]) -> io::Result<()> {
    let mut s = stdout.lock();
    s.write_all(b" - ")?;
    s.set_color(ColorSpec::new().set_bold(true))?;
    s.write_all(subject.as_bytes())?;
    s.set_color(ColorSpec::new().set_dimmed(true))?;
    s.write_all(b" [")?;
    s.set_color(ColorSpec::new().set_fg(Some(color)))?;
    s.write_all(summary)?;
    s.set_color(ColorSpec::new().set_dimmed(true))?;
    s.write_all(b"]\n")?;
    s.reset()
}
