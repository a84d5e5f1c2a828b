use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use env_logger::Env;
use log::info;

use std::path::PathBuf;

use shop_reports::{
    cache::DEFAULT_CACHE_FILE,
    vat::{self, FlatRateReturn, Scheme, DEFAULT_HOME_COUNTRY},
    Cache, Client, Dimension, Order, Period, Report, Shop, StoreConfig,
};

/// VAT, corporate tax and sales reports from Shopify order data
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Print debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Where to keep cached orders
    #[arg(long, global = true, default_value = DEFAULT_CACHE_FILE)]
    cache_file: PathBuf,

    #[command(flatten)]
    store: StoreConfig,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print sales figures for a VAT return. Example: vat flat 2020-05-01 2020-07-31
    Vat {
        #[arg(value_enum)]
        scheme: Scheme,

        #[command(flatten)]
        period: PeriodArgs,

        /// Country the store is VAT-registered in
        #[arg(long, default_value = DEFAULT_HOME_COUNTRY)]
        home_country: String,
    },
    /// Print turnover, excluding VAT, for corporate tax purposes
    CorporateTax {
        #[command(flatten)]
        period: PeriodArgs,
    },
    /// Print sales broken down by product tag
    Tag {
        /// Tags to report sales for (comma-separated)
        #[arg(long, value_delimiter = ',', required = true)]
        tags: Vec<String>,

        #[command(flatten)]
        period: PeriodArgs,

        #[command(flatten)]
        output: OutputArgs,
    },
    /// Print sales broken down by vendor
    Vendor {
        #[command(flatten)]
        period: PeriodArgs,

        #[command(flatten)]
        output: OutputArgs,
    },
}

#[derive(Args, Debug)]
struct PeriodArgs {
    /// Period start and end dates (e.g. 2020-08-01 2020-10-31)
    #[arg(required = true, num_args = 2, value_names = ["FROM", "TO"])]
    dates: Vec<String>,

    /// Use cached results
    #[arg(long)]
    cached: bool,
}

#[derive(Args, Debug)]
struct OutputArgs {
    /// Export results as a CSV file
    #[arg(long)]
    out: Option<PathBuf>,

    /// Group configuration file (`NAME | REGEX` per line)
    #[arg(long)]
    groups: Option<PathBuf>,

    /// Sort rows by revenue instead of items fulfilled
    #[arg(long)]
    sort_by_revenue: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(level)).init();

    match &cli.command {
        Command::Vat {
            scheme: Scheme::Flat,
            period,
            home_country,
        } => {
            let (period, orders) = fetch_orders(&cli, period)?;
            print!(
                "{}",
                FlatRateReturn::compute(&orders, &period, &home_country.to_uppercase())?
            );
        }
        Command::CorporateTax { period } => {
            let (period, orders) = fetch_orders(&cli, period)?;
            let turnover = vat::net_turnover(&orders, &period)
                .context("calculating total turnover")?;
            println!("Total turnover, excluding VAT: {turnover}");
        }
        Command::Tag {
            tags,
            period,
            output,
        } => {
            let mut report = Report::new(Dimension::Tag);
            report.restrict_to(tags.as_slice());
            breakdown(&cli, report, period, output)?;
        }
        Command::Vendor { period, output } => {
            breakdown(&cli, Report::new(Dimension::Vendor), period, output)?;
        }
    }
    Ok(())
}

fn fetch_orders(cli: &Cli, args: &PeriodArgs) -> Result<(Period, Vec<Order>)> {
    let period = Period::parse(args.dates.as_slice()).context("error parsing period dates")?;
    cli.store.validate()?;
    let mut shop = Shop::new(Client::new(&cli.store));
    if args.cached {
        shop = shop.with_cache(Cache::new(&cli.cache_file));
    }
    let orders = shop.list_orders(&period).context("error getting orders")?;
    info!("Found {} orders", orders.len());
    Ok((period, orders))
}

fn breakdown(cli: &Cli, mut report: Report, args: &PeriodArgs, output: &OutputArgs) -> Result<()> {
    if let Some(path) = &output.groups {
        report.read_groups(path)?;
    }
    report.sort_by_revenue = output.sort_by_revenue;
    let (period, orders) = fetch_orders(cli, args)?;
    report.add_orders(&orders, &period)?;
    print!("{report}");
    if let Some(path) = &output.out {
        report.write_csv(path).context("error exporting csv")?;
        info!("Exported {}", path.display());
    }
    Ok(())
}
