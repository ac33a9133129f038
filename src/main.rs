use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use stella_crm::commands;
use stella_crm::config::Config;
use stella_crm::db::{Database, TaskFilter};
use stella_crm::services::{processor, telegram};
use stella_crm::state::AppState;
use stella_crm::utils::format_decimal;

#[derive(Parser)]
#[command(name = "stella", about = "CRM остекления: счета, проекты, задачи, Telegram-бот")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Запустить Telegram-бота (long polling)
    Bot,
    /// Распознать один файл счета (PDF/PNG/JPEG)
    Process { file: PathBuf },
    /// Обработать все счета в папке
    Scan { folder: PathBuf },
    /// Прогнать парсер по тексту без записи в базу
    Parse {
        /// Файл с текстом; без него текст читается из stdin
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Сводка по расходам
    Stats {
        /// Период ГГГГ-ММ, по умолчанию текущий месяц
        #[arg(long)]
        period: Option<String>,
    },
    /// Последние счета
    Invoices {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Отметить счет оплаченным
    Paid { invoice_id: String },
    /// Исправить поле счета вручную
    Edit {
        invoice_id: String,
        field: String,
        value: String,
    },
    /// Привязать счет к проекту
    Attach {
        invoice_id: String,
        project_id: String,
    },
    /// Активные проекты
    Projects,
    /// Создать проект
    AddProject {
        number: String,
        title: String,
        #[arg(long)]
        client: Option<String>,
        #[arg(long)]
        address: Option<String>,
        #[arg(long)]
        budget: Option<String>,
        #[arg(long)]
        due: Option<String>,
    },
    /// Сменить статус проекта
    ProjectStatus { project_id: String, status: String },
    /// Счета проекта
    ProjectInvoices { project_id: String },
    /// Задачи
    Tasks,
    /// Создать задачу
    AddTask {
        title: String,
        #[arg(long)]
        description: Option<String>,
        /// 1 — срочно, 2 — обычная, 3 — не горит
        #[arg(long)]
        priority: Option<i64>,
        #[arg(long)]
        project: Option<String>,
        #[arg(long)]
        assignee: Option<String>,
        #[arg(long)]
        due: Option<String>,
    },
    /// Сменить статус задачи
    TaskStatus { task_id: String, status: String },
    /// Поставщики
    Suppliers,
    /// Добавить поставщика
    AddSupplier {
        name: String,
        #[arg(long)]
        inn: Option<String>,
        #[arg(long)]
        category: Option<String>,
    },
    /// Сменить категорию расходов поставщика
    SupplierCategory {
        supplier_id: String,
        category: String,
    },
    /// Сотрудники
    Employees,
    /// Добавить сотрудника
    AddEmployee {
        full_name: String,
        #[arg(long)]
        role: Option<String>,
        #[arg(long)]
        phone: Option<String>,
    },
    /// Записать отработанную смену сотрудника
    Shift {
        employee_id: String,
        hours: f64,
        #[arg(long)]
        project: Option<String>,
        /// Дата смены, по умолчанию сегодня
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        note: Option<String>,
    },
    /// Смены сотрудника
    Shifts { employee_id: String },
    /// Привязать Telegram-аккаунт сотрудника по коду из бота
    Link { code: String, employee_id: String },
    /// Сохранить исправление полей счета (JSON с полями ParsedInvoice)
    Correct {
        invoice_id: String,
        /// Файл с исправленным JSON
        json_file: PathBuf,
    },
    /// Отчет о качестве парсера по сохраненным исправлениям
    Quality,
    /// Запустить внешний скрипт переобучения
    Retrain,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;
    let db = Database::open(std::path::Path::new(&config.database_path))?;
    let state = AppState::new(db, config);

    match cli.command {
        Command::Bot => telegram::run(Arc::new(state)).await?,
        Command::Process { file } => {
            let invoice = commands::invoices::process_file(&state, &file).await?;
            println!("{}", serde_json::to_string_pretty(&invoice)?);
        }
        Command::Scan { folder } => {
            let (processed, failed) = processor::scan_folder(&state, &folder).await?;
            println!("Обработано: {}, с ошибками: {}", processed, failed);
        }
        Command::Parse { file } => {
            let text = match file {
                Some(path) => std::fs::read_to_string(path)?,
                None => {
                    use std::io::Read;
                    let mut buf = String::new();
                    std::io::stdin().read_to_string(&mut buf)?;
                    buf
                }
            };
            println!("{}", commands::invoices::parse_text(&text)?);
        }
        Command::Stats { period } => {
            let stats = commands::dashboard::get_dashboard_stats(&state, period)?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
        Command::Invoices { limit } => {
            for invoice in commands::invoices::list_invoices(&state, limit)? {
                println!(
                    "{}  №{}  {}  {} руб  [{}]  {}",
                    invoice.id,
                    invoice.invoice_number.as_deref().unwrap_or("б/н"),
                    invoice.invoice_date.as_deref().unwrap_or("—"),
                    format_decimal(invoice.total_amount),
                    invoice.status,
                    invoice.supplier_name.as_deref().unwrap_or("—"),
                );
            }
        }
        Command::Paid { invoice_id } => {
            commands::invoices::mark_paid(&state, &invoice_id)?;
            println!("Счет {} отмечен оплаченным", invoice_id);
        }
        Command::Edit {
            invoice_id,
            field,
            value,
        } => {
            commands::invoices::update_invoice_field(&state, &invoice_id, &field, &value)?;
            println!("Поле {} обновлено", field);
        }
        Command::Attach {
            invoice_id,
            project_id,
        } => {
            commands::invoices::attach_to_project(&state, &invoice_id, &project_id)?;
            println!("Счет {} привязан к проекту {}", invoice_id, project_id);
        }
        Command::Projects => {
            for project in commands::projects::list_projects(&state, Some("active"), 50)? {
                println!("{}  {}  {}", project.id, project.number, project.title);
            }
        }
        Command::AddProject {
            number,
            title,
            client,
            address,
            budget,
            due,
        } => {
            let project = commands::projects::create_project(
                &state,
                commands::projects::NewProject {
                    number,
                    title,
                    client_name: client,
                    address,
                    budget,
                    due_date: due,
                    description: None,
                },
            )?;
            println!("Проект создан: {}", project.id);
        }
        Command::ProjectStatus { project_id, status } => {
            commands::projects::set_project_status(&state, &project_id, &status)?;
            println!("Статус проекта обновлен");
        }
        Command::ProjectInvoices { project_id } => {
            for invoice in commands::invoices::list_for_project(&state, &project_id)? {
                println!(
                    "{}  №{}  {}  {} руб  [{}]",
                    invoice.id,
                    invoice.invoice_number.as_deref().unwrap_or("б/н"),
                    invoice.invoice_date.as_deref().unwrap_or("—"),
                    format_decimal(invoice.total_amount),
                    invoice.status,
                );
            }
        }
        Command::Tasks => {
            let filter = TaskFilter {
                limit: Some(50),
                ..Default::default()
            };
            for task in commands::tasks::list_tasks(&state, &filter)? {
                println!("{}  [{}]  {}", task.id, task.status.as_str(), task.title);
            }
        }
        Command::AddTask {
            title,
            description,
            priority,
            project,
            assignee,
            due,
        } => {
            let task = commands::tasks::create_task(
                &state,
                commands::tasks::NewTask {
                    title,
                    description,
                    priority,
                    project_id: project,
                    assignee_id: assignee,
                    due_date: due,
                },
            )?;
            println!("Задача создана: {}", task.id);
        }
        Command::TaskStatus { task_id, status } => {
            commands::tasks::set_task_status(&state, &task_id, &status)?;
            println!("Статус задачи обновлен");
        }
        Command::Suppliers => {
            for supplier in commands::suppliers::list_suppliers(&state)? {
                println!(
                    "{}  {}  ИНН {}  [{}]",
                    supplier.id,
                    supplier.name,
                    supplier.inn.as_deref().unwrap_or("—"),
                    supplier.category.as_str(),
                );
            }
        }
        Command::AddSupplier {
            name,
            inn,
            category,
        } => {
            let supplier = commands::suppliers::add_supplier(
                &state,
                &name,
                inn.as_deref(),
                category.as_deref(),
            )?;
            println!("Поставщик создан: {}", supplier.id);
        }
        Command::SupplierCategory {
            supplier_id,
            category,
        } => {
            commands::suppliers::set_supplier_category(&state, &supplier_id, &category)?;
            println!("Категория обновлена");
        }
        Command::Employees => {
            for employee in commands::employees::list_employees(&state)? {
                println!(
                    "{}  {}  {}",
                    employee.id,
                    employee.full_name,
                    employee.role.as_deref().unwrap_or("—"),
                );
            }
        }
        Command::AddEmployee {
            full_name,
            role,
            phone,
        } => {
            let employee = commands::employees::add_employee(
                &state,
                &full_name,
                role.as_deref(),
                phone.as_deref(),
            )?;
            println!("Сотрудник создан: {}", employee.id);
        }
        Command::Shift {
            employee_id,
            hours,
            project,
            date,
            note,
        } => {
            let shift = commands::shifts::record_shift(
                &state,
                commands::shifts::NewShift {
                    employee_id,
                    project_id: project,
                    shift_date: date,
                    hours,
                    note,
                },
            )?;
            println!("Смена записана: {} ч, {}", shift.hours, shift.shift_date);
        }
        Command::Shifts { employee_id } => {
            for shift in commands::shifts::list_shifts(&state, &employee_id)? {
                println!(
                    "{}  {} ч  {}",
                    shift.shift_date,
                    shift.hours,
                    shift.note.as_deref().unwrap_or("—"),
                );
            }
        }
        Command::Link { code, employee_id } => {
            println!("{}", commands::employees::link_telegram(&state, &code, &employee_id)?);
        }
        Command::Correct {
            invoice_id,
            json_file,
        } => {
            let corrected = serde_json::from_str(&std::fs::read_to_string(json_file)?)?;
            commands::training::record_correction(&state, &invoice_id, corrected)?;
            println!("Исправление сохранено");
        }
        Command::Quality => {
            let report = commands::training::quality_report(&state)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Retrain => {
            println!("{}", commands::training::retrain(&state)?);
        }
    }

    Ok(())
}
