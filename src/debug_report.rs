use morphosearch::{AnalysisVerbose, PassMetrics, Solution, WordForm};

mod ansi {
    pub const RESET: &str = "\x1b[0m";
    pub const DIM: &str = "\x1b[2m";
    pub const BOLD: &str = "\x1b[1m";

    pub const GREEN: &str = "\x1b[32m";
    pub const YELLOW: &str = "\x1b[33m";
    pub const BLUE: &str = "\x1b[34m";
    pub const CYAN: &str = "\x1b[36m";
    pub const GRAY: &str = "\x1b[90m";

    pub struct Palette {
        enabled: bool,
    }

    impl Palette {
        pub fn new(enabled: bool) -> Self {
            Self { enabled }
        }

        pub fn paint(&self, s: impl AsRef<str>, color: &str) -> String {
            if self.enabled { format!("{}{}{}", color, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }

        pub fn bold(&self, s: impl AsRef<str>) -> String {
            if self.enabled { format!("{}{}{}", BOLD, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }

        pub fn dim(&self, s: impl AsRef<str>) -> String {
            if self.enabled { format!("{}{}{}", DIM, s.as_ref(), RESET) } else { s.as_ref().to_string() }
        }
    }
}

pub fn print_run(run: &AnalysisVerbose, color: bool) {
    let palette = ansi::Palette::new(color);
    println!(
        "\n{} {}",
        palette.bold(palette.paint(format!("⚙  Analyzing: \"{}\"", run.text), ansi::CYAN)),
        palette.dim(format!("(layer {})", run.layer.0))
    );

    // Search summary
    let search = &run.details.search;
    println!("\n{}", palette.paint("━━━ Search ━━━", ansi::GRAY));
    println!(
        "  {} {}  {} {}  {} {}/{}  {} {}",
        palette.dim("solutions:"),
        palette.paint(search.solutions.to_string(), ansi::GREEN),
        palette.dim("depth:"),
        palette.paint(search.depth_watermark.to_string(), ansi::YELLOW),
        palette.dim("memo hits/misses:"),
        search.memo_hits,
        search.memo_misses,
        palette.dim("rule applications:"),
        palette.paint(search.rule_applications.to_string(), ansi::BLUE),
    );

    println!("\n{}", palette.paint("━━━ Passes ━━━", ansi::GRAY));
    for pass in [&run.details.prune, &run.details.filter].into_iter().chain(&run.details.passes) {
        print_pass(pass, &palette);
    }

    // Results
    println!("\n{}", palette.paint("━━━ Solutions ━━━", ansi::GRAY));
    if run.form.is_empty() {
        println!("{}", palette.dim("  No solutions produced"));
        println!("\n{}", palette.paint("Possible reasons:", ansi::YELLOW));
        println!("  • The word is not in the catalog and no rule label matched");
        println!("  • Every derivation needed more depth than --max-depth allows");
        println!("\n{}", palette.dim("  Tip: Set MORPHOSEARCH_LOG=morphosearch=trace to see every rule application"));
    } else {
        print_form(&run.form, 1, &palette);
    }

    // Timing
    println!("\n{}", palette.paint("━━━ Timing ━━━", ansi::GRAY));
    println!(
        "  Total: {}  │  Search: {}  │  Rating: {}",
        palette.paint(format!("{:?}", run.details.total), ansi::GREEN),
        palette.paint(format!("{:?}", search.duration), ansi::CYAN),
        palette.dim(format!("{:?}", run.details.rating)),
    );
    println!();
}

fn print_pass(pass: &PassMetrics, palette: &ansi::Palette) {
    println!(
        "  {} {} {}",
        palette.paint(format!("{}:", pass.name), ansi::BLUE),
        if pass.removed() > 0 {
            palette.paint(format!("✂ {} removed", pass.removed()), ansi::YELLOW)
        } else {
            palette.dim("unchanged")
        },
        palette.dim(format!("{:?}", pass.duration))
    );
}

fn print_form(form: &WordForm, indent: usize, palette: &ansi::Palette) {
    let pad = "  ".repeat(indent);
    for (idx, solution) in form.solutions.iter().enumerate() {
        println!("{pad}{} {}", palette.paint(format!("[{idx}]"), ansi::GRAY), fmt_solution(solution, palette));
        for (side, sub) in [("left", &solution.left), ("right", &solution.right)] {
            if let Some(sub) = sub {
                println!("{pad}    {} {}", palette.dim(format!("{side}:")), palette.paint(format!("\"{}\"", sub.entry), ansi::CYAN));
                print_form(sub, indent + 3, palette);
            }
        }
    }
}

fn fmt_solution(solution: &Solution, palette: &ansi::Palette) -> String {
    let status = if solution.is_success() {
        palette.bold(palette.paint(format!("{:.4}", solution.rating), ansi::GREEN))
    } else {
        palette.paint(format!("✗ {:?}", solution.content.error), ansi::YELLOW)
    };
    let rules: Vec<String> = solution.rules.iter().flatten().map(|rule| rule.id.to_string()).collect();

    let mut line = format!("{status} {} {}", palette.dim("│ id"), solution.content.id);
    if !rules.is_empty() {
        line.push_str(&format!(" {} {}", palette.dim("│ rules"), palette.paint(rules.join(","), ansi::BLUE)));
    }
    if let Some(sandhi) = &solution.sandhi {
        line.push_str(&format!(" {} {}", palette.dim("│ sandhi"), sandhi.expression));
    }
    if solution.original.is_some() {
        line.push_str(&format!(" {}", palette.dim("(derived)")));
    }
    line
}
