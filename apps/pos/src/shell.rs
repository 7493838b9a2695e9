//! # Interactive Shell
//!
//! Reads lines from stdin, splits them like a POSIX shell would (quotes and
//! backslashes, no expansion) and parses them with [`ShellLine`]. Command
//! errors are printed and the loop goes on; only a broken terminal ends it.
//!
//! ```text
//! bistro(walt)> order open "Patio 1"
//! bistro(walt)> order add 260307-0001 <product-id> -q 2 --note "no onions"
//! bistro(walt)> order send 260307-0001
//! ```

use std::fmt::Write as _;
use std::time::Duration;

use chrono::{Local, Utc};
use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::debug;

use bistro_core::Money;

use crate::cli::{
    AuditArgs, CategoriesCommand, KitchenCommand, OrderCommand, ProductsCommand, SettingsCommand,
    ShellCommand, ShellLine, TablesCommand, UsersCommand,
};
use crate::commands::audit::{AuditPage, AuditQuery};
use crate::commands::menu::{CategoryDto, CategoryUpdate, NewProduct, ProductDto, ProductUpdate};
use crate::commands::orders::{AddItem, OrderDto};
use crate::commands::reports::SalesReport;
use crate::commands::tables::{TableDto, TableUpdate};
use crate::commands::users::{NewUser, UserDto, UserUpdate};
use crate::commands::{
    audit, auth, backup, kitchen, menu, orders, receipt, reports, settings, tables, users,
};
use crate::error::{ApiError, ApiResult};
use crate::state::AppContext;

/// What the loop does after a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Splits a line into arguments.
///
/// Single quotes are literal, double quotes allow `\"`, and a `#` at the
/// start of a line comments it out.
pub fn tokenize(line: &str) -> Result<Vec<String>, String> {
    if line.trim_start().starts_with('#') {
        return Ok(Vec::new());
    }

    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some('"'), '\\') | (None, '\\') => match chars.next() {
                Some(escaped) => {
                    current.push(escaped);
                    in_token = true;
                }
                None => return Err("Line ends with a backslash".to_string()),
            },
            (Some(_), c) => current.push(c),
            (None, '"' | '\'') => {
                quote = Some(c);
                in_token = true;
            }
            (None, c) if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            (None, c) => {
                current.push(c);
                in_token = true;
            }
        }
    }

    if let Some(q) = quote {
        return Err(format!("Unclosed {} quote", q));
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}

/// Runs the prompt on stdin until `quit` or end of input.
pub async fn run(ctx: &AppContext) -> ApiResult<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut out = tokio::io::stdout();

    emit(&mut out, "Bistro POS. Type `help` for commands, `quit` to leave.\n").await?;

    loop {
        let prompt = match ctx.session.get().await {
            Some(session) => format!("bistro({})> ", session.username),
            None => "bistro> ".to_string(),
        };
        emit(&mut out, &prompt).await?;

        let Some(line) = lines.next_line().await.map_err(io_error)? else {
            emit(&mut out, "\n").await?;
            break;
        };
        if handle_line(ctx, &line, &mut out).await? == Flow::Quit {
            break;
        }
    }
    Ok(())
}

/// Parses and runs one line, writing the result or the error to `out`.
pub async fn handle_line<W>(ctx: &AppContext, line: &str, out: &mut W) -> ApiResult<Flow>
where
    W: AsyncWrite + Unpin,
{
    let tokens = match tokenize(line) {
        Ok(tokens) if tokens.is_empty() => return Ok(Flow::Continue),
        Ok(tokens) => tokens,
        Err(message) => {
            emit(out, &format!("error: {}\n", message)).await?;
            return Ok(Flow::Continue);
        }
    };

    let parsed = match ShellLine::try_parse_from(&tokens) {
        Ok(parsed) => parsed,
        Err(err) => {
            // Covers `help` and `--help` as well as real mistakes.
            emit(out, &err.render().to_string()).await?;
            return Ok(Flow::Continue);
        }
    };

    debug!(command = %tokens[0], "Shell command");
    match execute(ctx, parsed.command, out).await {
        Ok(flow) => Ok(flow),
        Err(err) => {
            emit(out, &format!("error {}\n", err)).await?;
            Ok(Flow::Continue)
        }
    }
}

async fn execute<W>(ctx: &AppContext, command: ShellCommand, out: &mut W) -> ApiResult<Flow>
where
    W: AsyncWrite + Unpin,
{
    let (db, session) = (&ctx.db, &ctx.session);

    let text = match command {
        ShellCommand::Quit => return Ok(Flow::Quit),

        ShellCommand::Login { login, password } => {
            let me = auth::login(db, session, &login, &password).await?;
            format!("Welcome, {} ({})\n", me.display_name, me.role)
        }
        ShellCommand::Logout => {
            auth::logout(session).await?;
            "Signed out\n".to_string()
        }
        ShellCommand::Whoami => {
            let me = auth::whoami(session).await?;
            format!(
                "{} ({}), {}, since {}\n",
                me.display_name,
                me.username,
                me.role,
                me.logged_in_at.with_timezone(&Local).format("%H:%M")
            )
        }
        ShellCommand::Passwd { old, new } => {
            auth::change_password(db, session, &old, &new).await?;
            "Password changed\n".to_string()
        }
        ShellCommand::Verify { login, code } => {
            auth::verify_email(db, &login, &code).await?;
            "Email verified\n".to_string()
        }
        ShellCommand::ResetRequest { email } => {
            auth::request_password_reset(db, ctx.mailer.as_ref(), &email).await?;
            "If the address is known, a reset code is on its way\n".to_string()
        }
        ShellCommand::Reset {
            email,
            code,
            new_password,
        } => {
            auth::reset_password(db, &email, &code, &new_password).await?;
            "Password reset, you can log in now\n".to_string()
        }

        ShellCommand::Users(cmd) => users_command(ctx, cmd).await?,
        ShellCommand::Categories(cmd) => categories_command(ctx, cmd).await?,
        ShellCommand::Products(cmd) => products_command(ctx, cmd).await?,
        ShellCommand::Tables(cmd) => tables_command(ctx, cmd).await?,
        ShellCommand::Order(cmd) => order_command(ctx, cmd).await?,
        ShellCommand::Kitchen(KitchenCommand::Watch { cycles }) => {
            watch_kitchen(ctx, cycles, out).await?;
            String::new()
        }
        ShellCommand::Kitchen(cmd) => kitchen_command(ctx, cmd).await?,
        ShellCommand::Settings(cmd) => settings_command(ctx, cmd).await?,

        ShellCommand::Report { from, to, top } => {
            let from = from.unwrap_or_else(|| Local::now().date_naive());
            let report = reports::sales_report(db, session, from, to.unwrap_or(from), top).await?;
            render_report(&report)
        }
        ShellCommand::Audit(args) => {
            let page = audit::list_audit(db, session, audit_query(args)).await?;
            render_audit(&page)
        }
        ShellCommand::Receipt { order, preview } => {
            let printed =
                receipt::print_receipt(db, session, &ctx.config.printer, &order, preview).await?;
            match printed.device {
                Some(device) => format!("Receipt {} sent to {} ({} bytes)\n", printed.order_number, device, printed.bytes),
                None => printed.preview,
            }
        }
        ShellCommand::Backup { path } => {
            let written = backup::backup_database(db, session, &path).await?;
            format!("Backup written to {} ({} bytes)\n", written.path.display(), written.size_bytes)
        }
        ShellCommand::Restore { path } => {
            let summary = backup::restore_database(db, session, &path).await?;
            let mut text = format!("Restored from {}\n", summary.source.display());
            if !summary.repaired_tables.is_empty() {
                let _ = writeln!(text, "Table status repaired: {}", summary.repaired_tables.join(", "));
            }
            text.push_str("Signed out, please log in again\n");
            text
        }
    };

    emit(out, &text).await?;
    Ok(Flow::Continue)
}

async fn users_command(ctx: &AppContext, cmd: UsersCommand) -> ApiResult<String> {
    let (db, session) = (&ctx.db, &ctx.session);
    Ok(match cmd {
        UsersCommand::List => render_users(&users::list_users(db, session).await?),
        UsersCommand::Add {
            username,
            email,
            password,
            role,
            name,
        } => {
            let input = NewUser {
                display_name: name.unwrap_or_else(|| username.clone()),
                username,
                email,
                password,
                role,
            };
            let user = users::register_user(db, session, ctx.mailer.as_ref(), input).await?;
            format!("Created {} [{}], verification code mailed to {}\n", user.username, user.id, user.email)
        }
        UsersCommand::Update {
            id,
            name,
            email,
            role,
            active,
        } => {
            let update = UserUpdate {
                display_name: name,
                email,
                role,
                is_active: active,
            };
            render_users(&[users::update_user(db, session, &id, update).await?])
        }
        UsersCommand::Delete { id } => {
            users::delete_user(db, session, &id).await?;
            "User deleted\n".to_string()
        }
        UsersCommand::Purge { id } => {
            users::purge_user(db, session, &id).await?;
            "User purged\n".to_string()
        }
        UsersCommand::Resend { id } => {
            users::send_verification(db, session, ctx.mailer.as_ref(), &id).await?;
            "Verification code sent\n".to_string()
        }
    })
}

async fn categories_command(ctx: &AppContext, cmd: CategoriesCommand) -> ApiResult<String> {
    let (db, session) = (&ctx.db, &ctx.session);
    Ok(match cmd {
        CategoriesCommand::List => render_categories(&menu::list_categories(db, session).await?),
        CategoriesCommand::Add {
            name,
            description,
            position,
        } => {
            let category =
                menu::create_category(db, session, &name, description.as_deref(), position).await?;
            render_categories(&[category])
        }
        CategoriesCommand::Update {
            id,
            name,
            description,
            position,
        } => {
            let update = CategoryUpdate {
                name,
                description,
                sort_order: position,
            };
            render_categories(&[menu::update_category(db, session, &id, update).await?])
        }
        CategoriesCommand::Delete { id } => {
            menu::delete_category(db, session, &id).await?;
            "Category deleted\n".to_string()
        }
    })
}

async fn products_command(ctx: &AppContext, cmd: ProductsCommand) -> ApiResult<String> {
    let (db, session) = (&ctx.db, &ctx.session);
    Ok(match cmd {
        ProductsCommand::List { category } => {
            render_products(&menu::list_products(db, session, category.as_deref()).await?)
        }
        ProductsCommand::Search { query, limit } => {
            let query = query.join(" ");
            render_products(&menu::search_products(db, session, &query, limit).await?)
        }
        ProductsCommand::Show { id } => render_products(&[menu::get_product(db, session, &id).await?]),
        ProductsCommand::Add {
            name,
            price,
            category,
            description,
        } => {
            let input = NewProduct {
                name,
                category_id: category,
                description,
                price_cents: price,
            };
            render_products(&[menu::create_product(db, session, input).await?])
        }
        ProductsCommand::Update {
            id,
            name,
            price,
            category,
            description,
            available,
        } => {
            let update = ProductUpdate {
                name,
                category_id: category,
                description,
                price_cents: price,
                is_available: available,
            };
            render_products(&[menu::update_product(db, session, &id, update).await?])
        }
        ProductsCommand::Delete { id } => {
            menu::delete_product(db, session, &id).await?;
            "Product removed from the menu\n".to_string()
        }
        ProductsCommand::Purge { id } => {
            menu::purge_product(db, session, &id).await?;
            "Product purged\n".to_string()
        }
    })
}

async fn tables_command(ctx: &AppContext, cmd: TablesCommand) -> ApiResult<String> {
    let (db, session) = (&ctx.db, &ctx.session);
    Ok(match cmd {
        TablesCommand::List => render_tables(&tables::list_tables(db, session).await?),
        TablesCommand::Add { name, seats } => {
            render_tables(&[tables::create_table(db, session, &name, seats).await?])
        }
        TablesCommand::Update { table, name, seats } => {
            let update = TableUpdate { name, seats };
            render_tables(&[tables::update_table(db, session, &table, update).await?])
        }
        TablesCommand::Delete { table } => {
            tables::delete_table(db, session, &table).await?;
            "Table deleted\n".to_string()
        }
        TablesCommand::Clear { table } => render_tables(&[tables::clear_table(db, session, &table).await?]),
    })
}

async fn order_command(ctx: &AppContext, cmd: OrderCommand) -> ApiResult<String> {
    let (db, session) = (&ctx.db, &ctx.session);
    let order = match cmd {
        OrderCommand::Open { table, note } => orders::open_order(db, session, &table, note.as_deref()).await?,
        OrderCommand::Add {
            order,
            product,
            qty,
            note,
        } => {
            let input = AddItem {
                order,
                product_id: product,
                quantity: qty,
                note,
            };
            orders::add_item(db, session, input).await?
        }
        OrderCommand::Set { line, qty, note } => {
            orders::update_item(db, session, &line, qty, note.as_deref()).await?
        }
        OrderCommand::Remove { line } => orders::remove_item(db, session, &line).await?,
        OrderCommand::Send { order } => orders::send_to_kitchen(db, session, &order).await?,
        OrderCommand::Pay { order, method } => orders::pay_order(db, session, &order, method).await?,
        OrderCommand::Cancel { order } => {
            orders::cancel_order(db, session, &order).await?;
            return Ok(format!("Order {} cancelled\n", order));
        }
        OrderCommand::Show { order } => orders::get_order(db, session, &order).await?,
        OrderCommand::List => {
            let open = orders::list_open_orders(db, session).await?;
            if open.is_empty() {
                return Ok("No open orders\n".to_string());
            }
            let mut text = String::new();
            for order in &open {
                let _ = writeln!(
                    text,
                    "{:<12} {:<8} {:<16} {:>3} lines {:>10}{}",
                    order.order_number,
                    order.table_name.as_deref().unwrap_or("-"),
                    order.waiter_name.as_deref().unwrap_or("-"),
                    order.lines.len(),
                    order.total(),
                    if order.sent_to_kitchen { "  sent" } else { "" }
                );
            }
            return Ok(text);
        }
    };
    Ok(render_order(&order))
}

async fn kitchen_command(ctx: &AppContext, cmd: KitchenCommand) -> ApiResult<String> {
    let (db, session) = (&ctx.db, &ctx.session);
    Ok(match cmd {
        KitchenCommand::Queue | KitchenCommand::Watch { .. } => {
            kitchen::render_queue(&kitchen::kitchen_queue(db, session).await?, Utc::now())
        }
        KitchenCommand::OrderStatus { order, status } => {
            kitchen::set_order_kitchen_status(db, session, &order, status).await?;
            format!("Order {} is {}\n", order, status.as_str())
        }
        KitchenCommand::LineStatus { line, status } => {
            kitchen::set_line_kitchen_status(db, session, &line, status).await?;
            format!("Line is {}\n", status.as_str())
        }
    })
}

/// Redraws the kitchen queue every `kitchen_refresh_secs` until Ctrl-C or
/// until `cycles` redraws have been shown.
async fn watch_kitchen<W>(ctx: &AppContext, cycles: Option<u32>, out: &mut W) -> ApiResult<()>
where
    W: AsyncWrite + Unpin,
{
    let period = Duration::from_secs(ctx.config.kitchen_refresh_secs);
    let mut shown = 0u32;

    loop {
        let tickets = kitchen::kitchen_queue(&ctx.db, &ctx.session).await?;
        let now = Local::now();
        emit(out, &format!("── {} ──\n", now.format("%H:%M:%S"))).await?;
        emit(out, &kitchen::render_queue(&tickets, now.with_timezone(&Utc))).await?;

        shown += 1;
        if cycles.is_some_and(|max| shown >= max) {
            break;
        }
        tokio::select! {
            _ = tokio::time::sleep(period) => {}
            _ = tokio::signal::ctrl_c() => {
                emit(out, "\n").await?;
                break;
            }
        }
    }
    Ok(())
}

async fn settings_command(ctx: &AppContext, cmd: SettingsCommand) -> ApiResult<String> {
    let (db, session) = (&ctx.db, &ctx.session);
    Ok(match cmd {
        SettingsCommand::List => {
            let mut text = String::new();
            for setting in settings::list_settings(db, session).await? {
                let _ = writeln!(text, "{:<20} = {}", setting.key, setting.value);
            }
            text
        }
        SettingsCommand::Get { key } => format!("{}\n", settings::get_setting(db, session, &key).await?),
        SettingsCommand::Set { key, value } => {
            let saved = settings::set_setting(db, session, &key, &value).await?;
            format!("{} = {}\n", saved.key, saved.value)
        }
        SettingsCommand::Delete { key } => {
            settings::delete_setting(db, session, &key).await?;
            format!("{} removed, the default applies\n", key)
        }
    })
}

fn audit_query(args: AuditArgs) -> AuditQuery {
    AuditQuery {
        entity_type: args.entity,
        entity_key: args.key,
        action: args.action,
        user_name: args.user,
        from: args.from,
        to: args.to,
        limit: args.limit,
        offset: args.offset,
    }
}

// ============================================================================
// Rendering
// ============================================================================

fn render_users(users: &[UserDto]) -> String {
    let mut text = String::new();
    for user in users {
        let mut flags = Vec::new();
        if !user.is_active {
            flags.push("inactive");
        }
        if !user.email_verified {
            flags.push("unverified");
        }
        let _ = writeln!(
            text,
            "{}  {:<14} {:<20} {:<8} {}",
            user.id,
            user.username,
            user.display_name,
            user.role,
            flags.join(",")
        );
    }
    text
}

fn render_categories(categories: &[CategoryDto]) -> String {
    let mut text = String::new();
    for category in categories {
        let _ = writeln!(text, "{}  {:>3}  {}", category.id, category.sort_order, category.name);
    }
    text
}

fn render_products(products: &[ProductDto]) -> String {
    if products.is_empty() {
        return "No products\n".to_string();
    }
    let mut text = String::new();
    for product in products {
        let _ = writeln!(
            text,
            "{}  {:<32} {:>9}{}",
            product.id,
            product.name,
            product.price,
            if product.is_available { "" } else { "  sold out" }
        );
    }
    text
}

fn render_tables(tables: &[TableDto]) -> String {
    if tables.is_empty() {
        return "No tables\n".to_string();
    }
    let mut text = String::new();
    for table in tables {
        let _ = writeln!(
            text,
            "{:<12} {:>2} seats  {:<10} {}",
            table.name,
            table.seats,
            table.status.label(),
            table.open_order.as_deref().unwrap_or("")
        );
    }
    text
}

fn render_order(order: &OrderDto) -> String {
    let mut text = String::new();
    let _ = writeln!(
        text,
        "Order {}  table {}  waiter {}  {}{}",
        order.order_number,
        order.table_name.as_deref().unwrap_or("-"),
        order.waiter_name.as_deref().unwrap_or("-"),
        order.status.as_str(),
        if order.sent_to_kitchen {
            format!(", kitchen {}", order.kitchen_status.as_str())
        } else {
            String::new()
        }
    );
    for line in &order.lines {
        let _ = writeln!(
            text,
            "  {:>3}x {:<30} {:>9} {:>10}  [{}]",
            line.quantity,
            line.name,
            Money::from_cents(line.unit_price_cents),
            Money::from_cents(line.line_total_cents),
            line.id
        );
        if let Some(note) = &line.note {
            let _ = writeln!(text, "        * {}", note);
        }
    }
    let _ = writeln!(text, "  {:<47}{:>10}", "Subtotal", Money::from_cents(order.subtotal_cents));
    let _ = writeln!(text, "  {:<47}{:>10}", "Tax", Money::from_cents(order.tax_cents));
    let _ = writeln!(text, "  {:<47}{:>10}", "Total", order.total());
    if let Some(method) = order.payment_method {
        let _ = writeln!(text, "  Paid by {}", method.as_str());
    }
    text
}

fn render_report(report: &SalesReport) -> String {
    let mut text = String::new();
    let _ = writeln!(text, "Sales {} .. {}", report.from, report.to);
    let _ = writeln!(text, "  Orders         {:>10}", report.order_count);
    let _ = writeln!(text, "  Subtotal       {:>10}", Money::from_cents(report.subtotal_cents));
    let _ = writeln!(text, "  Tax            {:>10}", Money::from_cents(report.tax_cents));
    let _ = writeln!(text, "  Total          {:>10}", Money::from_cents(report.total_cents));
    let _ = writeln!(text, "  Average ticket {:>10}", Money::from_cents(report.average_ticket_cents));

    if !report.top_products.is_empty() {
        let _ = writeln!(text, "Best sellers");
        for product in &report.top_products {
            let _ = writeln!(
                text,
                "  {:>4}x {:<30} {:>10}",
                product.quantity,
                product.name,
                Money::from_cents(product.revenue_cents)
            );
        }
    }
    if !report.by_waiter.is_empty() {
        let _ = writeln!(text, "By waiter");
        for waiter in &report.by_waiter {
            let _ = writeln!(
                text,
                "  {:<20} {:>4} orders {:>10}",
                waiter.waiter_name,
                waiter.order_count,
                Money::from_cents(waiter.total_cents)
            );
        }
    }
    text
}

fn render_audit(page: &AuditPage) -> String {
    let mut text = String::new();
    for entry in &page.entries {
        let _ = writeln!(
            text,
            "{}  {:<16} {:<11} {:<12} {}  {}",
            entry.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S"),
            entry.user_name,
            entry.action.as_str(),
            entry.entity_type,
            entry.entity_key,
            entry.changes
        );
    }
    let shown = page.entries.len() as i64;
    let _ = writeln!(
        text,
        "{}-{} of {}",
        if shown == 0 { 0 } else { page.offset as i64 + 1 },
        page.offset as i64 + shown,
        page.total
    );
    text
}

async fn emit<W>(out: &mut W, text: &str) -> ApiResult<()>
where
    W: AsyncWrite + Unpin,
{
    out.write_all(text.as_bytes()).await.map_err(io_error)?;
    out.flush().await.map_err(io_error)
}

fn io_error(err: std::io::Error) -> ApiError {
    ApiError::internal(format!("Terminal I/O failed: {}", err))
}
