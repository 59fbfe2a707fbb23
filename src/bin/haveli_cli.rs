use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveDateTime;
use clap::{ArgAction, Args, Parser, Subcommand};
use haveli_api::{
    cart::{CartEngine, SpiceLevel, TaxRate, TipPercent, Totals},
    catalog::{CatalogLookup, CateringMenu, MenuCategory, MenuItem, OpeningHours, StaticCatalog},
    config::{self, AppConfig},
};
use serde::Serialize;

fn main() -> Result<()> {
    let cli = Cli::parse();
    let context = CliContext::initialize()?;

    match cli.command {
        Commands::Menu(args) => handle_menu(&context, args, cli.json)?,
        Commands::Catering(args) => handle_catering(&context, args, cli.json)?,
        Commands::Hours(args) => handle_hours(&context, args, cli.json)?,
        Commands::Quote(args) => handle_quote(&context, args, cli.json)?,
    }

    Ok(())
}

#[derive(Parser)]
#[command(name = "haveli", about = "Haveli menu, hours and order quotes", version)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List menu items
    Menu(MenuArgs),
    /// List catering packages or price an event
    Catering(CateringArgs),
    /// Show opening hours
    Hours(HoursArgs),
    /// Price a hypothetical order the way checkout would
    Quote(QuoteArgs),
}

#[derive(Args)]
struct MenuArgs {
    #[arg(long, help = "Only show one category, e.g. \"Breads\"")]
    category: Option<String>,
    #[arg(long, action = ArgAction::SetTrue, help = "Only show featured dishes")]
    featured: bool,
}

#[derive(Args)]
struct CateringArgs {
    #[arg(long, help = "Package to quote")]
    package: Option<String>,
    #[arg(long, requires = "package", help = "Guest count for the quote")]
    guests: Option<u32>,
    #[arg(long = "add-on", requires = "package", help = "Add-on to include; repeatable")]
    add_ons: Vec<String>,
}

#[derive(Args)]
struct HoursArgs {
    #[arg(
        long,
        value_parser = parse_local_time,
        help = "Local time to check, formatted YYYY-MM-DDTHH:MM"
    )]
    at: Option<NaiveDateTime>,
}

#[derive(Args)]
struct QuoteArgs {
    #[arg(
        long = "item",
        required = true,
        value_parser = parse_item_spec,
        help = "Line as id[:qty[:spice[:instructions]]]; repeatable"
    )]
    items: Vec<ItemSpec>,
    #[arg(long, default_value_t = 0, help = "Tip percent: 0, 10, 15 or 20")]
    tip: u32,
}

#[derive(Clone, Debug)]
struct ItemSpec {
    item_id: String,
    quantity: u32,
    spice_level: Option<SpiceLevel>,
    instructions: Option<String>,
}

fn parse_item_spec(raw: &str) -> Result<ItemSpec, String> {
    let mut parts = raw.splitn(4, ':');
    let item_id = parts
        .next()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| "item id is required".to_string())?
        .to_string();
    let quantity = match parts.next().map(str::trim).filter(|q| !q.is_empty()) {
        Some(q) => q
            .parse::<u32>()
            .map_err(|_| format!("invalid quantity `{q}`"))?,
        None => 1,
    };
    let spice_level = match parts.next().map(str::trim).filter(|s| !s.is_empty()) {
        Some(s) => Some(SpiceLevel::from_str(s).map_err(|_| format!("unknown spice level `{s}`"))?),
        None => None,
    };
    let instructions = parts.next().map(str::to_string);
    Ok(ItemSpec {
        item_id,
        quantity,
        spice_level,
        instructions,
    })
}

fn parse_local_time(raw: &str) -> Result<NaiveDateTime, String> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M")
        .map_err(|e| format!("expected YYYY-MM-DDTHH:MM: {e}"))
}

struct CliContext {
    config: AppConfig,
    catalog: StaticCatalog,
    catering: CateringMenu,
}

impl CliContext {
    fn initialize() -> Result<Self> {
        let config = config::load_config().context("failed to load configuration")?;
        config::init_tracing(config.log_level(), false);
        Ok(Self {
            config,
            catalog: StaticCatalog::haveli(),
            catering: CateringMenu::haveli(),
        })
    }

    fn hours(&self) -> OpeningHours {
        OpeningHours::haveli_with_offset_minutes(self.config.restaurant_utc_offset_minutes)
    }
}

fn handle_menu(context: &CliContext, args: MenuArgs, json: bool) -> Result<()> {
    let mut items: Vec<&MenuItem> = match args.category.as_deref() {
        Some(raw) => {
            let category = MenuCategory::from_str(raw)
                .map_err(|_| anyhow!("unknown category `{raw}`"))?;
            context.catalog.by_category(category)
        }
        None => context.catalog.items().iter().collect(),
    };
    if args.featured {
        items.retain(|item| item.featured);
    }

    if json {
        return print_json(&items);
    }
    if items.is_empty() {
        println!("No dishes match.");
        return Ok(());
    }
    for item in items {
        render_menu_item(item);
    }
    Ok(())
}

fn handle_catering(context: &CliContext, args: CateringArgs, json: bool) -> Result<()> {
    let Some(package_id) = args.package else {
        if json {
            return print_json(&context.catering);
        }
        for package in &context.catering.packages {
            println!(
                "- {} ({}) • {} per person • min {} guests",
                package.name,
                package.id,
                format_cents(package.price_per_person_cents),
                package.min_guests
            );
        }
        for add_on in &context.catering.add_ons {
            println!("  + {} ({}) • {}", add_on.name, add_on.id, format_cents(add_on.price_cents));
        }
        return Ok(());
    };

    let guests = args
        .guests
        .ok_or_else(|| anyhow!("--guests is required to quote a package"))?;
    let quote = context
        .catering
        .quote(&package_id, guests, &args.add_ons)
        .context("failed to quote catering")?;

    if json {
        return print_json(&quote);
    }
    println!(
        "{} guests × {} = {}",
        quote.guests,
        format_cents(quote.per_person_cents),
        format_cents(quote.food_cents)
    );
    if !quote.add_on_ids.is_empty() {
        println!(
            "Add-ons ({}) = {}",
            quote.add_on_ids.join(", "),
            format_cents(quote.add_ons_cents)
        );
    }
    println!("Estimated total: {}", format_cents(quote.total_cents));
    Ok(())
}

#[derive(Serialize)]
struct HoursOutput {
    status: haveli_api::catalog::OpenStatus,
    schedule: Vec<haveli_api::catalog::hours::DaySchedule>,
}

fn handle_hours(context: &CliContext, args: HoursArgs, json: bool) -> Result<()> {
    let hours = context.hours();
    let status = match args.at {
        Some(at) => hours.status_at(at),
        None => hours.status_now(),
    };
    let output = HoursOutput {
        status,
        schedule: hours.weekly_schedule(),
    };

    if json {
        return print_json(&output);
    }
    match &output.status.detail {
        Some(detail) => println!("{} • {}", output.status.label, detail),
        None => println!("{}", output.status.label),
    }
    for day in &output.schedule {
        if day.windows.is_empty() {
            println!("  {:<10} closed", day.day);
        } else {
            println!("  {:<10} {}", day.day, day.windows.join(", "));
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct QuoteOutput {
    lines: Vec<haveli_api::cart::OrderLine>,
    tip_percent: u8,
    totals: Totals,
}

fn handle_quote(context: &CliContext, args: QuoteArgs, json: bool) -> Result<()> {
    let tax_rate = TaxRate::new(context.config.tax_rate).context("invalid tax rate")?;
    let tip = TipPercent::checkout_choice(args.tip).context("invalid tip")?;

    let mut engine = CartEngine::hydrated();
    for line in &args.items {
        if line.quantity == 0 {
            bail!("quantity for `{}` must be at least 1", line.item_id);
        }
        engine
            .add_line(
                &context.catalog,
                &line.item_id,
                line.quantity,
                line.spice_level,
                line.instructions.as_deref(),
            )
            .with_context(|| format!("failed to add `{}`", line.item_id))?;
    }

    let output = QuoteOutput {
        lines: engine.lines().to_vec(),
        tip_percent: tip.value(),
        totals: engine.totals(tax_rate, tip),
    };

    if json {
        return print_json(&output);
    }
    for line in &output.lines {
        println!(
            "- {} × {} @ {} = {}",
            line.quantity,
            line.payment_description(),
            format_cents(line.unit_price_cents),
            format_cents(line.line_total_cents())
        );
    }
    println!("Subtotal: {}", format_cents(output.totals.subtotal_cents));
    println!("Tax:      {}", format_cents(output.totals.tax_cents));
    if output.totals.tip_cents > 0 {
        println!(
            "Tip ({}%): {}",
            output.tip_percent,
            format_cents(output.totals.tip_cents)
        );
    }
    println!("Total:    {}", format_cents(output.totals.grand_total_cents));
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn render_menu_item(item: &MenuItem) {
    let mut tags = Vec::new();
    if item.vegetarian {
        tags.push("veg");
    }
    if item.spicy {
        tags.push("spicy");
    }
    if item.featured {
        tags.push("featured");
    }
    let tags = if tags.is_empty() {
        String::new()
    } else {
        format!(" [{}]", tags.join(", "))
    };
    println!(
        "- {} ({}) • {} • {}{}",
        item.name,
        item.id,
        item.category,
        format_cents(item.price_cents),
        tags
    );
}

fn format_cents(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{sign}${}.{:02}", abs / 100, abs % 100)
}
