//! VibeDB expression runner - resolves, checks and evaluates sample expressions

use anyhow::{Context, Result};
use clap::{Parser as ClapParser, ValueEnum};
use std::sync::Arc;
use vibedb_expr::access::{DataType, RangeColumn, Value, MICROS_PER_DAY};
use vibedb_expr::catalog::{InMemorySchema, RoutineInfo};
use vibedb_expr::config::EngineConfig;
use vibedb_expr::expression::{
    check_deterministic, ConstraintKind, Expression, QueryResult, StaticPlan, SubQuery,
};
use vibedb_expr::session::Session;

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Scenario {
    /// CHECK and GENERATED validation
    Check,
    /// VALUES list typing
    Values,
    /// Subquery materialization over a scan
    Subquery,
    /// Everything
    All,
}

/// VibeDB expression runner
#[derive(ClapParser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Scenario to run
    #[arg(short, long, value_enum, default_value = "all")]
    scenario: Scenario,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Seed for RANDOM()
    #[arg(long)]
    seed: Option<u64>,

    /// Pin the statement clock to this many days since 1970-01-01
    #[arg(long)]
    today: Option<i64>,

    /// Session time zone offset in seconds
    #[arg(long, default_value = "0")]
    tz_offset: i32,

    /// Largest array the engine will build
    #[arg(long, default_value = "1024")]
    max_array_cardinality: usize,
}

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    let mut config = EngineConfig::new()
        .with_time_zone_offset(args.tz_offset)
        .with_max_array_cardinality(args.max_array_cardinality);
    if let Some(seed) = args.seed {
        config = config.with_random_seed(seed);
    }
    if let Some(today) = args.today {
        let micros = today
            .checked_mul(MICROS_PER_DAY)
            .context("--today is out of range")?;
        config = config.with_fixed_timestamp(micros);
    }

    let schema = Arc::new(create_schema());
    let session = Session::new(config).with_services(schema.clone());

    let run = |scenario: Scenario| args.scenario == Scenario::All || args.scenario == scenario;
    if run(Scenario::Check) {
        run_check(&schema, &session).context("check scenario failed")?;
    }
    if run(Scenario::Values) {
        run_values(&session).context("values scenario failed")?;
    }
    if run(Scenario::Subquery) {
        run_subquery(&schema, session).context("subquery scenario failed")?;
    }

    Ok(())
}

fn create_schema() -> InMemorySchema {
    let schema = InMemorySchema::new();
    schema.create_table(
        "employees",
        vec![
            RangeColumn::new("id", DataType::Int32),
            RangeColumn::new("name", DataType::Varchar),
            RangeColumn::new("hire_date", DataType::Date),
            RangeColumn::new("salary", DataType::Double),
            RangeColumn::generated("bonus", DataType::Double),
        ],
    );
    schema.create_sequence("emp_seq", 1, 1);
    schema.create_routine(
        RoutineInfo::new("double_it", DataType::Double),
        Arc::new(|args: &[Value]| match args {
            [Value::Double(v)] => Ok(Value::Double(v * 2.0)),
            _ => Ok(Value::Null),
        }),
    );
    schema
}

fn run_check(schema: &InMemorySchema, session: &Session) -> Result<()> {
    let range = schema
        .range_variable("employees", 0)
        .context("employees table is missing")?;

    let hired = || Expression::gt(Expression::current_date(), Expression::column("hire_date"));
    let candidates = vec![
        (ConstraintKind::Check, hired()),
        (
            ConstraintKind::Check,
            Expression::and(
                hired(),
                Expression::gt(Expression::random(), Expression::literal(Value::Double(0.5))),
            ),
        ),
        (ConstraintKind::Generated, hired()),
        (
            ConstraintKind::Generated,
            Expression::routine(
                RoutineInfo::new("double_it", DataType::Double),
                vec![Expression::column("salary")],
            ),
        ),
        (
            ConstraintKind::Generated,
            Expression::add_expr(Expression::column("bonus"), Expression::literal(Value::Int32(1))),
        ),
    ];

    println!("== {} validation ==", range.table_name);
    for (kind, mut expr) in candidates {
        let sql = expr.to_string();
        match check_deterministic(&mut expr, &range, kind, schema, session) {
            Ok(()) => println!("  {:<18} {}: accepted", kind.to_string(), sql),
            Err(e) => println!("  {:<18} {}: rejected ({})", kind.to_string(), sql, e),
        }
    }
    println!();
    Ok(())
}

fn run_values(session: &Session) -> Result<()> {
    let mut list = Expression::value_list(vec![
        Expression::row(vec![Expression::literal(Value::Int32(1)), Expression::null()]),
        Expression::row(vec![
            Expression::literal(Value::Double(2.5)),
            Expression::literal(Value::String("x".to_string())),
        ]),
    ])?;
    list.resolve_types(session)?;

    println!("== VALUES {} ==", list);
    print!("{}", list.explain());
    for row in list.table_rows(session)? {
        let fields: Vec<String> = row.iter().map(|v| v.to_string()).collect();
        println!("  ({})", fields.join(", "));
    }

    let mut array = Expression::array(vec![
        Expression::literal(Value::Int32(1)),
        Expression::literal(Value::Double(2.5)),
    ]);
    array.resolve_types(session)?;
    let element_type = array
        .data_type()
        .map(|t| t.name())
        .unwrap_or_else(|| "NULL".to_string());
    println!("  {} : {} = {}", array, element_type, array.evaluate(session)?);
    println!();
    Ok(())
}

fn run_subquery(schema: &InMemorySchema, mut session: Session) -> Result<()> {
    let range = schema
        .range_variable("employees", 0)
        .context("employees table is missing")?;
    let average = SubQuery::new(
        StaticPlan::new(vec![DataType::Double], vec![vec![Value::Double(5000.0)]])
            .with_sql("SELECT AVG(salary) FROM employees"),
    );

    let mut predicate = Expression::gt(
        Expression::column("salary"),
        Expression::row_subquery(average.clone()),
    );
    predicate.resolve_columns(std::slice::from_ref(&range))?;
    predicate.resolve_types(&session)?;

    println!("== WHERE {} ==", predicate);
    let rows = [
        (1, "alice", 4000.0),
        (2, "bob", 6500.0),
        (3, "carol", 5200.0),
    ];
    for (id, name, salary) in rows {
        session.set_current_row(
            range.position,
            vec![
                Value::Int32(id),
                Value::String(name.to_string()),
                Value::Date(0),
                Value::Double(salary),
                Value::Null,
            ],
        );
        let matched = predicate.test_condition(&session)?;
        println!("  {:<6} {:>8.1} -> {}", name, salary, matched);
    }
    println!(
        "  subquery materialized {} time(s) over {} rows",
        average.materialization_count(),
        rows.len()
    );

    let mut next_id = Expression::next_value("emp_seq");
    next_id.resolve_types(&session)?;
    if let QueryResult::Value(value) = next_id.get_result(&session)? {
        println!("  {} = {}", next_id, value);
    }
    average.release();
    Ok(())
}
