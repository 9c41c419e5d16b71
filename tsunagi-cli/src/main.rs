//! Tsunagi CLI - コマンドラインインターフェース
//!
//! 模擬デバッギを操作して、非同期境界をまたぐスタックの相関を試すREPL

use anyhow::{Context, Result};
use clap::Parser;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::EnvFilter;
use tsunagi_core::config::DEFAULT_MAX_STACK_LENGTH;
use tsunagi_core::store::DEFAULT_STORE_CAPACITY;
use tsunagi_core::{CapturePointConfig, Command, CorrelationConfig, Debugger, ValueSpec};
use tsunagi_engine::{Location, MockEngine, ObjectRef, ThreadId, Value};

/// Tsunagi - Async Stack Correlation Debugger
#[derive(Parser)]
#[command(name = "tsunagi")]
#[command(version = "0.1.0")]
#[command(about = "Stitches logical call chains across asynchronous hand-offs", long_about = None)]
struct Cli {
    /// Maximum number of frames kept per captured stack
    #[arg(long, default_value_t = DEFAULT_MAX_STACK_LENGTH)]
    max_stack_length: usize,

    /// Maximum number of captured stacks kept per session
    #[arg(long, default_value_t = DEFAULT_STORE_CAPACITY)]
    capacity: usize,

    /// Do not snapshot visible variables of captured frames
    #[arg(long)]
    no_variables: bool,

    /// Do not stitch captured stacks into backtraces
    #[arg(long)]
    no_async_stacks: bool,

    /// Capture point definition: <Class>.<method>[:<expr>] => [<Class>].<method>[:<expr>]
    #[arg(long = "capture", value_name = "DEFINITION")]
    captures: Vec<CapturePointConfig>,

    /// Run commands from a file instead of the interactive prompt
    #[arg(long)]
    script: Option<PathBuf>,
}

impl Cli {
    fn correlation_config(&self) -> CorrelationConfig {
        CorrelationConfig {
            max_stack_length: self.max_stack_length,
            store_capacity: self.capacity,
            capture_variables: !self.no_variables,
            async_stacks_enabled: !self.no_async_stacks,
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    println!("Tsunagi - Async Stack Correlation Debugger");
    println!("Version 0.1.0");
    println!();

    let mut simulator = Simulator::new(cli.correlation_config(), cli.captures.clone())?;
    match &cli.script {
        Some(path) => run_script(&mut simulator, path)?,
        None => run_repl(&mut simulator)?,
    }
    simulator.debugger.shutdown();

    Ok(())
}

/// ログ出力を初期化する（RUST_LOG、既定は warn）
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// 模擬デバッギとデバッガの組
struct Simulator {
    engine: Arc<MockEngine>,
    debugger: Debugger,
    /// `@name` で参照するオブジェクト
    objects: HashMap<String, ObjectRef>,
    /// 表示済みのコンソール行数
    console_seen: usize,
    next_line: u32,
}

impl Simulator {
    fn new(config: CorrelationConfig, points: Vec<CapturePointConfig>) -> Result<Self> {
        let engine = Arc::new(MockEngine::new());
        let debugger = Debugger::start(engine.clone(), config, points)?;
        Ok(Self {
            engine,
            debugger,
            objects: HashMap::new(),
            console_seen: 0,
            next_line: 1,
        })
    }

    fn value(&self, spec: &ValueSpec) -> Result<Value> {
        Ok(match spec {
            ValueSpec::Null => Value::Null,
            ValueSpec::Int(v) => Value::int(*v),
            ValueSpec::Text(text) => Value::Object(self.engine.new_string(text)),
            ValueSpec::Named(name) => Value::Object(
                self.objects
                    .get(name)
                    .cloned()
                    .with_context(|| format!("Unknown object @{}", name))?,
            ),
        })
    }

    /// エンジンのコンソールに出た新しい行
    fn take_console(&mut self) -> Vec<String> {
        let console = self.engine.console();
        let lines = console[self.console_seen.min(console.len())..].to_vec();
        self.console_seen = console.len();
        lines
    }
}

/// REPLループを実行する
fn run_repl(simulator: &mut Simulator) -> Result<()> {
    println!("Type 'help' for available commands, 'quit' to exit.");
    println!();

    let mut rl = DefaultEditor::new()?;

    loop {
        let readline = rl.readline("(tsunagi) ");
        match readline {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }

                rl.add_history_entry(line)?;

                match handle_command(simulator, line) {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => eprintln!("Error: {:#}", e),
                }
                print_console(simulator);
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                break;
            }
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            }
        }
    }

    Ok(())
}

/// スクリプトファイルのコマンドを順に実行する（`#` 以降はコメント）
fn run_script(simulator: &mut Simulator, path: &Path) -> Result<()> {
    let script = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read script {}", path.display()))?;

    for line in script.lines() {
        let line = strip_comment(line).trim();
        if line.is_empty() {
            continue;
        }
        println!("(tsunagi) {}", line);

        let keep_going = match handle_command(simulator, line) {
            Ok(keep_going) => keep_going,
            Err(e) => {
                eprintln!("Error: {:#}", e);
                true
            }
        };
        print_console(simulator);
        if !keep_going {
            break;
        }
    }

    Ok(())
}

/// 引用符の外にある `#` から行末までを取り除く
fn strip_comment(line: &str) -> &str {
    let mut quoted = false;
    for (i, c) in line.char_indices() {
        match c {
            '"' => quoted = !quoted,
            '#' if !quoted => return &line[..i],
            _ => {}
        }
    }
    line
}

fn print_console(simulator: &mut Simulator) {
    for line in simulator.take_console() {
        println!("[console] {}", line);
    }
}

/// コマンドを処理する
///
/// 終了する場合は `false` を返します。
fn handle_command(simulator: &mut Simulator, line: &str) -> Result<bool> {
    let Some(command) = Command::parse(line) else {
        println!("Unknown command: {}", line);
        println!("Type 'help' for available commands.");
        return Ok(true);
    };
    debug!("command: {:?}", command);

    match command {
        Command::Help => print_help(),
        Command::Quit => {
            println!("Goodbye!");
            return Ok(false);
        }
        Command::Class { name, methods } => handle_class(simulator, &name, &methods),
        Command::New { name, type_name } => {
            let object = simulator.engine.new_object(&type_name);
            println!("@{} = {}", name, Value::Object(object.clone()));
            simulator.objects.insert(name, object);
        }
        Command::Field {
            object,
            field,
            value,
        } => {
            let target = simulator
                .objects
                .get(&object)
                .cloned()
                .with_context(|| format!("Unknown object @{}", object))?;
            let value = simulator.value(&value)?;
            simulator.engine.set_field(&target, &field, value);
        }
        Command::Call {
            thread,
            class,
            method,
            args,
        } => handle_call(simulator, ThreadId(thread), &class, &method, &args)?,
        Command::Set {
            thread,
            name,
            value,
        } => {
            let value = simulator.value(&value)?;
            simulator.engine.set_variable(ThreadId(thread), &name, value)?;
        }
        Command::Return(thread) => match simulator.engine.pop_frame(ThreadId(thread)) {
            Some(location) => println!("Thread {} returned from {}", thread, location),
            None => println!("Thread {} has no frames", thread),
        },
        Command::Backtrace(thread) => handle_backtrace(simulator, ThreadId(thread))?,
        Command::Add(definition) => {
            let point: CapturePointConfig = definition.parse()?;
            let index = simulator.debugger.add_capture_point(point.clone())?;
            println!("Capture point #{}: {}", index, point);
        }
        Command::Remove(index) => {
            let point = simulator.debugger.remove_capture_point(index)?;
            println!("Removed capture point: {}", point);
        }
        Command::Points => print_points(simulator),
        Command::Enable(index) => simulator.debugger.set_enabled(index, true)?,
        Command::Disable(index) => simulator.debugger.set_enabled(index, false)?,
        Command::Reload => {
            let generation = simulator.engine.reload_code();
            simulator.debugger.on_code_reload();
            println!("Code reloaded (generation {})", generation);
        }
        Command::Stats => print_stats(simulator),
    }

    Ok(true)
}

/// Classコマンドを処理する
fn handle_class(simulator: &Simulator, name: &str, methods: &[String]) {
    let methods: Vec<(&str, &str)> = methods.iter().map(|m| (m.as_str(), "()V")).collect();
    simulator.engine.load_class(name, &methods);
    println!("Loaded class {} ({} methods)", name, methods.len());
}

/// Callコマンドを処理する
fn handle_call(
    simulator: &mut Simulator,
    thread: ThreadId,
    class: &str,
    method: &str,
    args: &[ValueSpec],
) -> Result<()> {
    let args = args
        .iter()
        .map(|spec| simulator.value(spec))
        .collect::<Result<Vec<_>>>()?;

    let line = simulator.next_line;
    simulator.next_line += 1;
    let decisions = simulator
        .engine
        .enter_method(thread, Location::new(class, method, line), args);

    println!("Thread {} entered {}.{}", thread, class, method);
    if !decisions.is_empty() {
        println!("  {} capture point(s) hit", decisions.len());
    }
    Ok(())
}

/// Backtraceコマンドを処理する
fn handle_backtrace(simulator: &Simulator, thread: ThreadId) -> Result<()> {
    let trace = simulator.debugger.async_stack_trace(thread)?;
    if trace.live.is_empty() {
        println!("Thread {} has no frames", thread);
        return Ok(());
    }

    println!("Thread {} ({} frames):", thread, trace.depth());
    for line in trace.render() {
        println!("{}", line);
    }
    Ok(())
}

fn print_points(simulator: &Simulator) {
    let points = simulator.debugger.capture_points();
    if points.is_empty() {
        println!("No capture points");
        return;
    }

    println!("Capture points:");
    for (i, point) in points.iter().enumerate() {
        let state = if point.enabled { "enabled" } else { "disabled" };
        println!("  #{} [{}] {}", i, state, point);
    }
}

fn print_stats(simulator: &Simulator) {
    let config = simulator.debugger.config();
    println!("Installed capture points: {}", simulator.debugger.installed_count());
    println!(
        "Captured stacks:          {}/{}",
        simulator.debugger.stored_count(),
        config.store_capacity
    );
    println!("Max stack length:         {}", config.max_stack_length);
    println!("Compiled expressions:     {}", simulator.engine.compile_count());
    println!("Threads:                  {}", simulator.engine.threads().len());
}

fn print_help() {
    println!("Available commands:");
    println!();
    println!("  help           - Show this help message");
    println!("  quit/exit/q    - Exit the debugger");
    println!();
    println!("Debuggee commands:");
    println!("  class <Class> <method>...         - Load a class");
    println!("  new <name> <Type>                 - Create an object bound to @name");
    println!("  field @<obj> <field> <value>      - Set a field of an object");
    println!("  call <tid> <Class>.<method> [v..] - Enter a method on a thread");
    println!("  set <tid> <name> <value>          - Set a variable on the top frame");
    println!("  ret <tid>                         - Return from the top frame");
    println!("  bt <tid>                          - Show backtrace with async trace");
    println!("  reload                            - Reload code (drops compiled expressions)");
    println!();
    println!("Capture point commands:");
    println!("  add <definition>  - Add a capture point");
    println!("  remove <n>        - Remove capture point #n");
    println!("  points            - List capture points");
    println!("  enable <n>        - Enable capture point #n");
    println!("  disable <n>       - Disable capture point #n");
    println!("  stats             - Show correlation statistics");
    println!();
    println!("Values: null, 42, \"text\", @name");
    println!();
    println!("Examples:");
    println!("  class app.Producer submit");
    println!("  add app.Producer.submit:param_0 => app.Consumer.run:this.key");
    println!("  new job app.Job");
    println!("  call 1 app.Producer.submit @job");
    println!("  new task app.Consumer");
    println!("  field @task key @job");
    println!("  call 2 app.Consumer.run");
    println!("  set 2 this @task");
    println!("  bt 2");
}
