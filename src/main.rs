mod cli;

use clap::Parser;

use cli::{
    AccountsCommands, BudgetsCommands, Cli, Commands, PaymentsCommands, RemindCommands,
    ReportCommands, ReviewCommands, Session, TaxYearCommands, TenantsCommands,
};
use rentbook::error::Result;
use rentbook::settings::load_settings;
use rentbook::telemetry;

fn run(cli: Cli) -> Result<()> {
    let settings = load_settings()?;
    telemetry::init(&settings.log_level)?;
    let today = cli.today.as_deref().map(cli::parse_date_arg).transpose()?;

    match cli.command {
        Commands::Init { data_dir, storage } => cli::init::run(data_dir, storage),
        Commands::Demo => cli::demo::run(&settings, today),
        command => dispatch(&Session::open(&settings, today)?, command),
    }
}

fn dispatch(session: &Session, command: Commands) -> Result<()> {
    match command {
        Commands::Accounts { command } => match command {
            AccountsCommands::Add {
                name,
                balance,
                default,
            } => cli::accounts::add(session, &name, balance, default),
            AccountsCommands::List => cli::accounts::list(session),
        },
        Commands::Tenants { command } => match command {
            TenantsCommands::Add {
                first_name,
                last_name,
                rent,
                due_day,
                email,
                phone,
            } => cli::tenants::add(session, &first_name, &last_name, rent, due_day, email, phone),
            TenantsCommands::List => cli::tenants::list(session),
            TenantsCommands::Deactivate { id } => cli::tenants::deactivate(session, id),
        },
        Commands::Payments { command } => match command {
            PaymentsCommands::Add {
                tenant,
                due,
                amount,
                status,
            } => cli::payments::add(session, tenant, &due, amount, status),
            PaymentsCommands::List { tenant } => cli::payments::list(session, tenant),
        },
        Commands::Ingest { file, account } => cli::ingest::run(session, &file, account),
        Commands::Classify { statement } => cli::classify::run(session, statement),
        Commands::Review { command } => match command {
            ReviewCommands::List => cli::review::list(session),
            ReviewCommands::Assign {
                transaction,
                category,
            } => cli::review::assign(session, transaction, &category),
            ReviewCommands::Ignore { transaction } => cli::review::ignore(session, transaction),
        },
        Commands::Budgets { command } => match command {
            BudgetsCommands::Add {
                category,
                amount,
                period,
                name,
                start,
                end,
            } => cli::budgets::add(
                session,
                &category,
                amount,
                period,
                name,
                start.as_deref(),
                end.as_deref(),
            ),
            BudgetsCommands::List => cli::budgets::list(session),
        },
        Commands::Report { command } => match command {
            ReportCommands::Summary {
                month,
                year,
                from_date,
                to_date,
            } => cli::report::summary(session, month, year, from_date, to_date),
            ReportCommands::Periods { year, quarterly } => {
                cli::report::periods(session, year, quarterly)
            }
            ReportCommands::Budgets => cli::report::budgets(session),
        },
        Commands::Taxyear { command } => match command {
            TaxYearCommands::Open { label, start } => {
                cli::taxyear::open(session, label, start.as_deref())
            }
            TaxYearCommands::Close { id, rate } => cli::taxyear::close(session, id, rate),
            TaxYearCommands::List => cli::taxyear::list(session),
        },
        Commands::Late { refresh } => cli::late::run(session, refresh),
        Commands::Remind { command } => match command {
            RemindCommands::Schedule => cli::remind::schedule(session),
            RemindCommands::Deliver => cli::remind::deliver(session),
            RemindCommands::List => cli::remind::list(session),
            RemindCommands::Custom {
                payment,
                subject,
                message,
                date,
                channel,
            } => cli::remind::custom(session, payment, &subject, &message, date.as_deref(), channel),
            RemindCommands::Retry { id } => cli::remind::retry(session, id),
            RemindCommands::Cancel { id } => cli::remind::cancel(session, id),
            RemindCommands::Respond { id, message } => {
                cli::remind::respond(session, id, message.as_deref())
            }
        },
        Commands::Init { .. } | Commands::Demo => Ok(()),
    }
}

fn main() {
    if let Err(e) = run(Cli::parse()) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
