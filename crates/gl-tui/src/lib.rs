use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use log::info;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Tabs, Wrap};
use ratatui::{Frame, Terminal};
use std::io::{self, Stdout};
use std::time::{Duration, Instant};

use gl_core::{Category, Filter, Item, ItemId, ListId, Snapshot, Store, MAX_QUANTITY, MIN_QUANTITY};

const TICK_RATE: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, PartialEq, Eq)]
enum InputMode {
    None,
    AddItem,
    EditItem(ItemId),
    Note(Category),
    ListManager,
    NewList,
    RenameList(ListId),
    Confirm(ListId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FormField {
    Name,
    Quantity,
    Category,
}

/// Quantity and category chosen alongside the name input.
#[derive(Debug, Clone, Copy)]
struct ItemForm {
    field: FormField,
    quantity: u8,
    category: Category,
}

impl Default for ItemForm {
    fn default() -> Self {
        Self {
            field: FormField::Name,
            quantity: MIN_QUANTITY,
            category: Category::default(),
        }
    }
}

impl ItemForm {
    fn next_field(&mut self, with_category: bool) {
        self.field = match self.field {
            FormField::Name => FormField::Quantity,
            FormField::Quantity if with_category => FormField::Category,
            FormField::Quantity | FormField::Category => FormField::Name,
        };
    }

    fn adjust(&mut self, step: i8) {
        match self.field {
            FormField::Name => {}
            FormField::Quantity => {
                self.quantity = self
                    .quantity
                    .saturating_add_signed(step)
                    .clamp(MIN_QUANTITY, MAX_QUANTITY);
            }
            FormField::Category => {
                let index = Category::ALL
                    .iter()
                    .position(|category| *category == self.category)
                    .unwrap_or(0);
                let len = Category::ALL.len();
                let next = if step < 0 {
                    (index + len - 1) % len
                } else {
                    (index + 1) % len
                };
                self.category = Category::ALL[next];
            }
        }
    }
}

/// One line of the grouped item view.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Row {
    Header(Category),
    Note(Category),
    Item(ItemId, Category),
}

impl Row {
    fn category(&self) -> Category {
        match self {
            Row::Header(category) | Row::Note(category) | Row::Item(_, category) => *category,
        }
    }
}

struct App {
    store: Store,
    rows_state: ListState,
    lists_state: ListState,
    input_mode: InputMode,
    input: TextInput,
    form: ItemForm,
    status: Option<String>,
    show_help: bool,
}

#[derive(Debug, Default, Clone)]
struct TextInput {
    content: String,
    cursor: usize,
}

impl TextInput {
    fn from(content: String) -> Self {
        let cursor = content.len();
        Self { content, cursor }
    }

    fn insert(&mut self, c: char) {
        self.content.insert(self.cursor, c);
        self.cursor += c.len_utf8();
    }

    fn delete_back(&mut self) {
        if let Some(c) = self.content[..self.cursor].chars().next_back() {
            self.cursor -= c.len_utf8();
            self.content.remove(self.cursor);
        }
    }

    fn move_left(&mut self) {
        if let Some(c) = self.content[..self.cursor].chars().next_back() {
            self.cursor -= c.len_utf8();
        }
    }

    fn move_right(&mut self) {
        if let Some(c) = self.content[self.cursor..].chars().next() {
            self.cursor += c.len_utf8();
        }
    }

    fn move_home(&mut self) {
        self.cursor = 0;
    }

    fn move_end(&mut self) {
        self.cursor = self.content.len();
    }

    /// Cursor position in characters, for placing the terminal cursor.
    fn column(&self) -> u16 {
        u16::try_from(self.content[..self.cursor].chars().count()).unwrap_or(u16::MAX)
    }

    fn reset(&mut self) {
        self.content.clear();
        self.cursor = 0;
    }

    /// Apply an editing key. Returns `false` for keys it does not handle.
    fn handle(&mut self, key: KeyEvent) -> bool {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            match key.code {
                KeyCode::Char('a') => self.move_home(),
                KeyCode::Char('e') => self.move_end(),
                KeyCode::Char('u') => self.reset(),
                _ => return false,
            }
            return true;
        }
        match key.code {
            KeyCode::Char(c) => self.insert(c),
            KeyCode::Backspace => self.delete_back(),
            KeyCode::Left => self.move_left(),
            KeyCode::Right => self.move_right(),
            KeyCode::Home => self.move_home(),
            KeyCode::End => self.move_end(),
            _ => return false,
        }
        true
    }
}

impl App {
    fn new(store: Store) -> Self {
        let mut rows_state = ListState::default();
        rows_state.select(Some(0));
        Self {
            store,
            rows_state,
            lists_state: ListState::default(),
            input_mode: InputMode::None,
            input: TextInput::default(),
            form: ItemForm::default(),
            status: None,
            show_help: false,
        }
    }

    fn state(&self) -> &Snapshot {
        self.store.state()
    }

    fn rows(&self) -> Vec<Row> {
        build_rows(self.state())
    }

    fn selected_row(&self) -> Option<Row> {
        let rows = self.rows();
        self.rows_state
            .selected()
            .and_then(|index| rows.get(index).cloned())
    }

    fn selected_item(&self) -> Option<ItemId> {
        match self.selected_row()? {
            Row::Item(id, _) => Some(id),
            Row::Header(_) | Row::Note(_) => None,
        }
    }

    /// Keep the cursor inside the row list after the rows changed.
    fn clamp_selection(&mut self) {
        let len = self.rows().len();
        match self.rows_state.selected() {
            _ if len == 0 => self.rows_state.select(None),
            Some(index) if index >= len => self.rows_state.select(Some(len - 1)),
            None => self.rows_state.select(Some(0)),
            Some(_) => {}
        }
    }

    fn select_row(&mut self, row: &Row) {
        if let Some(index) = self.rows().iter().position(|candidate| candidate == row) {
            self.rows_state.select(Some(index));
        }
    }

    fn set_status(&mut self, message: impl Into<String>) {
        self.status = Some(message.into());
    }

    fn item(&self, id: &ItemId) -> Option<&Item> {
        self.state().current_list().item(id)
    }
}

/// Header, optional note row, then items for every non-empty group.
fn build_rows(state: &Snapshot) -> Vec<Row> {
    let mut rows = Vec::new();
    for group in state.grouped_by_category() {
        if group.is_empty() {
            continue;
        }
        rows.push(Row::Header(group.category));
        if state.is_group_expanded(group.category) {
            rows.push(Row::Note(group.category));
        }
        rows.extend(
            group
                .items
                .iter()
                .map(|item| Row::Item(item.id.clone(), group.category)),
        );
    }
    rows
}

pub fn run(store: Store) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = ratatui::backend::CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(store);
    info!(
        "event=tui_start module=tui status=ok lists={}",
        app.state().lists().len()
    );

    let mut last_tick = Instant::now();

    loop {
        terminal.draw(|frame| render_app(frame, &app))?;

        let timeout = TICK_RATE.saturating_sub(last_tick.elapsed());
        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press && handle_key(&mut app, key) {
                    break;
                }
            }
        }

        if last_tick.elapsed() >= TICK_RATE {
            last_tick = Instant::now();
        }
    }

    restore_terminal(terminal)?;
    info!("event=tui_stop module=tui status=ok");
    Ok(())
}

/// Route a key press. Returns `true` when the app should exit.
fn handle_key(app: &mut App, key: KeyEvent) -> bool {
    match app.input_mode.clone() {
        InputMode::None => return handle_normal_key(app, key),
        InputMode::AddItem => handle_item_form(app, key, None),
        InputMode::EditItem(id) => handle_item_form(app, key, Some(id)),
        InputMode::Note(category) => handle_note_input(app, key, category),
        InputMode::ListManager => handle_list_manager(app, key),
        InputMode::NewList => handle_new_list(app, key),
        InputMode::RenameList(id) => handle_rename_list(app, key, &id),
        InputMode::Confirm(id) => handle_confirm(app, key, &id),
    }
    false
}

fn handle_normal_key(app: &mut App, key: KeyEvent) -> bool {
    if app.show_help {
        app.show_help = false;
        return false;
    }
    if app.state().dragged_item_id().is_some() {
        handle_drag_key(app, key);
        return false;
    }

    match key.code {
        KeyCode::Char('q') => return true,
        KeyCode::Char('?') => app.show_help = true,
        KeyCode::Char('j') | KeyCode::Down => move_cursor(app, 1),
        KeyCode::Char('k') | KeyCode::Up => move_cursor(app, -1),
        KeyCode::Home | KeyCode::Char('g') => app.rows_state.select(Some(0)),
        KeyCode::End | KeyCode::Char('G') => {
            let len = app.rows().len();
            app.rows_state.select(Some(len.saturating_sub(1)));
        }
        KeyCode::Tab => cycle_filter(app, 1),
        KeyCode::BackTab => cycle_filter(app, -1),
        KeyCode::Char(digit @ '1'..='3') => {
            let index = digit as usize - '1' as usize;
            set_filter(app, Filter::ALL[index]);
        }
        KeyCode::Char('a') => open_add_form(app),
        KeyCode::Char(' ' | 'x') => toggle_selected(app),
        KeyCode::Char('d') | KeyCode::Delete => delete_selected(app),
        KeyCode::Char('e') | KeyCode::Enter => activate_selected(app),
        KeyCode::Char('J') => shift_selected(app, 1),
        KeyCode::Char('K') => shift_selected(app, -1),
        KeyCode::Char('m') => start_drag(app),
        KeyCode::Char('n') => toggle_notes(app),
        KeyCode::Char('l') => open_list_manager(app),
        KeyCode::Char(']') => cycle_list(app, 1),
        KeyCode::Char('[') => cycle_list(app, -1),
        KeyCode::Esc => app.status = None,
        _ => {}
    }
    false
}

fn move_cursor(app: &mut App, step: isize) {
    let len = app.rows().len();
    if len == 0 {
        return;
    }
    let current = app.rows_state.selected().unwrap_or(0);
    let next = current.saturating_add_signed(step).min(len - 1);
    app.rows_state.select(Some(next));
}

fn cycle_filter(app: &mut App, step: isize) {
    let current = app.state().filter();
    let index = Filter::ALL
        .iter()
        .position(|filter| *filter == current)
        .unwrap_or(0);
    let len = Filter::ALL.len();
    let next = if step < 0 {
        (index + len - 1) % len
    } else {
        (index + 1) % len
    };
    set_filter(app, Filter::ALL[next]);
}

fn set_filter(app: &mut App, filter: Filter) {
    if app.store.set_filter(filter).is_applied() {
        app.rows_state.select(Some(0));
        app.clamp_selection();
    }
}

fn open_add_form(app: &mut App) {
    app.input.reset();
    app.form = ItemForm::default();
    if let Some(row) = app.selected_row() {
        app.form.category = row.category();
    }
    app.input_mode = InputMode::AddItem;
}

fn toggle_selected(app: &mut App) {
    let Some(id) = app.selected_item() else {
        return;
    };
    if app.store.toggle_item(&id).is_applied() {
        app.clamp_selection();
    }
}

fn delete_selected(app: &mut App) {
    let Some(id) = app.selected_item() else {
        return;
    };
    let name = app.item(&id).map(|item| item.name.clone()).unwrap_or_default();
    if app.store.delete_item(&id).is_applied() {
        app.clamp_selection();
        app.set_status(format!("Removed {name}"));
    }
}

/// Enter on a header toggles its note, on a note edits it, on an item edits the item.
fn activate_selected(app: &mut App) {
    match app.selected_row() {
        Some(Row::Header(category)) => {
            let _ = app.store.toggle_group_expanded(category);
        }
        Some(Row::Note(category)) => open_note_input(app, category),
        Some(Row::Item(id, _)) => open_edit_form(app, id),
        None => {}
    }
}

fn open_edit_form(app: &mut App, id: ItemId) {
    let Some((name, quantity)) = app.item(&id).map(|item| (item.name.clone(), item.quantity))
    else {
        return;
    };
    if app.store.begin_edit(&id).is_applied() {
        app.input = TextInput::from(name);
        app.form = ItemForm {
            quantity,
            ..ItemForm::default()
        };
        app.input_mode = InputMode::EditItem(id);
    }
}

fn open_note_input(app: &mut App, category: Category) {
    let note = app
        .state()
        .current_list()
        .note(category)
        .unwrap_or_default()
        .to_string();
    app.input = TextInput::from(note);
    app.input_mode = InputMode::Note(category);
}

fn toggle_notes(app: &mut App) {
    let Some(row) = app.selected_row() else {
        return;
    };
    let category = row.category();
    let _ = app.store.toggle_group_expanded(category);
    app.select_row(&Row::Header(category));
}

/// Move the selected item past its neighbour within the same group.
fn shift_selected(app: &mut App, step: isize) {
    let Some(Row::Item(id, category)) = app.selected_row() else {
        return;
    };
    let rows = app.rows();
    let Some(index) = rows.iter().position(|row| *row == Row::Item(id.clone(), category)) else {
        return;
    };
    let Some(target) = index
        .checked_add_signed(step)
        .and_then(|neighbour| rows.get(neighbour))
        .and_then(|row| match row {
            Row::Item(target, target_category) if *target_category == category => Some(target),
            _ => None,
        })
    else {
        return;
    };
    if app.store.reorder_item(&id, target).is_applied() {
        app.select_row(&Row::Item(id, category));
    }
}

fn start_drag(app: &mut App) {
    let Some(id) = app.selected_item() else {
        return;
    };
    if app.store.begin_drag(&id).is_applied() {
        let name = app.item(&id).map(|item| item.name.clone()).unwrap_or_default();
        app.set_status(format!("Moving {name}: choose a spot, m to drop, Esc to cancel"));
    }
}

fn handle_drag_key(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('j') | KeyCode::Down => {
            move_cursor(app, 1);
            sync_drag_target(app);
        }
        KeyCode::Char('k') | KeyCode::Up => {
            move_cursor(app, -1);
            sync_drag_target(app);
        }
        KeyCode::Char('m') | KeyCode::Enter => {
            let dragged = app.state().dragged_item_id().cloned();
            match app.state().drag_over_item_id().cloned() {
                Some(target) => {
                    let _ = app.store.drop_on(&target);
                }
                None => {
                    let _ = app.store.end_drag();
                }
            }
            if let Some(id) = dragged {
                let category = app.item(&id).map(|item| item.category).unwrap_or_default();
                app.select_row(&Row::Item(id, category));
            }
            app.status = None;
        }
        KeyCode::Esc => {
            let _ = app.store.end_drag();
            app.status = None;
        }
        _ => {}
    }
}

/// Hover the item under the cursor, or leave when the cursor is elsewhere.
fn sync_drag_target(app: &mut App) {
    match app.selected_item() {
        Some(id) if app.state().dragged_item_id() != Some(&id) => {
            let _ = app.store.drag_over(&id);
        }
        _ => {
            let _ = app.store.drag_leave();
        }
    }
}

fn cycle_list(app: &mut App, step: isize) {
    let lists = app.state().lists();
    let len = lists.len();
    let index = lists
        .iter()
        .position(|list| &list.id == app.state().current_list_id())
        .unwrap_or(0);
    let next = if step < 0 {
        (index + len - 1) % len
    } else {
        (index + 1) % len
    };
    let id = lists[next].id.clone();
    switch_list(app, &id);
}

fn switch_list(app: &mut App, id: &ListId) {
    if app.store.set_current_list(id).is_applied() {
        app.rows_state.select(Some(0));
        app.clamp_selection();
        let name = app.state().current_list().name.clone();
        app.set_status(format!("Switched to {name}"));
    }
}

fn handle_item_form(app: &mut App, key: KeyEvent, editing: Option<ItemId>) {
    match key.code {
        KeyCode::Esc => {
            if editing.is_some() {
                let _ = app.store.cancel_edit();
            }
            close_input(app);
        }
        KeyCode::Enter => {
            match editing {
                Some(id) => submit_edit(app, &id),
                None => submit_add(app),
            }
            close_input(app);
        }
        KeyCode::Tab => app.form.next_field(editing.is_none()),
        KeyCode::Up => app.form.adjust(1),
        KeyCode::Down => app.form.adjust(-1),
        _ if app.form.field == FormField::Name => {
            app.input.handle(key);
        }
        _ => {}
    }
}

fn submit_add(app: &mut App) {
    let ItemForm {
        quantity, category, ..
    } = app.form;
    match app
        .store
        .add_item(&app.input.content, i64::from(quantity), category)
    {
        Some(id) => {
            app.clamp_selection();
            app.select_row(&Row::Item(id, category));
            app.set_status(format!("Added to {category}"));
        }
        None => app.set_status("Item name cannot be blank"),
    }
}

fn submit_edit(app: &mut App, id: &ItemId) {
    let _ = app
        .store
        .save_edit(id, &app.input.content, i64::from(app.form.quantity));
    if app.item(id).is_none() {
        app.set_status("Removed item");
    }
    app.clamp_selection();
}

fn handle_note_input(app: &mut App, key: KeyEvent, category: Category) {
    match key.code {
        KeyCode::Esc => close_input(app),
        KeyCode::Enter => {
            if app
                .store
                .set_group_note(category, &app.input.content)
                .is_applied()
            {
                app.set_status(format!("Saved {category} note"));
            }
            close_input(app);
        }
        _ => {
            app.input.handle(key);
        }
    }
}

fn open_list_manager(app: &mut App) {
    let current = app.state().current_list_id().clone();
    let index = app
        .state()
        .lists()
        .iter()
        .position(|list| list.id == current)
        .unwrap_or(0);
    app.lists_state.select(Some(index));
    app.input_mode = InputMode::ListManager;
}

fn managed_list(app: &App) -> Option<ListId> {
    let index = app.lists_state.selected()?;
    app.state().lists().get(index).map(|list| list.id.clone())
}

fn handle_list_manager(app: &mut App, key: KeyEvent) {
    let len = app.state().lists().len();
    match key.code {
        KeyCode::Esc | KeyCode::Char('q' | 'l') => app.input_mode = InputMode::None,
        KeyCode::Char('j') | KeyCode::Down => {
            let next = app.lists_state.selected().map_or(0, |i| (i + 1) % len);
            app.lists_state.select(Some(next));
        }
        KeyCode::Char('k') | KeyCode::Up => {
            let next = app
                .lists_state
                .selected()
                .map_or(0, |i| (i + len - 1) % len);
            app.lists_state.select(Some(next));
        }
        KeyCode::Enter => {
            if let Some(id) = managed_list(app) {
                switch_list(app, &id);
            }
            app.input_mode = InputMode::None;
        }
        KeyCode::Char('c' | 'a') => {
            app.input.reset();
            app.input_mode = InputMode::NewList;
        }
        KeyCode::Char('r') => {
            if let Some(id) = managed_list(app) {
                let name = app
                    .state()
                    .lists()
                    .iter()
                    .find(|list| list.id == id)
                    .map(|list| list.name.clone())
                    .unwrap_or_default();
                app.input = TextInput::from(name);
                app.input_mode = InputMode::RenameList(id);
            }
        }
        KeyCode::Char('d') | KeyCode::Delete => {
            if len <= 1 {
                app.set_status("Cannot delete the last list");
            } else if let Some(id) = managed_list(app) {
                app.input_mode = InputMode::Confirm(id);
            }
        }
        _ => {}
    }
}

fn handle_new_list(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Esc => {
            app.input.reset();
            app.input_mode = InputMode::ListManager;
        }
        KeyCode::Enter => {
            match app.store.create_list(&app.input.content) {
                Some(_) => {
                    app.rows_state.select(Some(0));
                    app.clamp_selection();
                    let name = app.state().current_list().name.clone();
                    app.set_status(format!("Created {name}"));
                    close_input(app);
                }
                None => app.set_status("List name cannot be blank"),
            }
        }
        _ => {
            app.input.handle(key);
        }
    }
}

fn handle_rename_list(app: &mut App, key: KeyEvent, id: &ListId) {
    match key.code {
        KeyCode::Esc => {
            app.input.reset();
            app.input_mode = InputMode::ListManager;
        }
        KeyCode::Enter => {
            if app.input.content.trim().is_empty() {
                app.set_status("List name cannot be blank");
                return;
            }
            let _ = app.store.rename_list(id, &app.input.content);
            app.input.reset();
            app.input_mode = InputMode::ListManager;
        }
        _ => {
            app.input.handle(key);
        }
    }
}

fn handle_confirm(app: &mut App, key: KeyEvent, id: &ListId) {
    match key.code {
        KeyCode::Char('y' | 'Y') => {
            if app.store.delete_list(id).is_applied() {
                app.rows_state.select(Some(0));
                app.clamp_selection();
                app.set_status("List deleted");
            }
            let len = app.state().lists().len();
            let index = app.lists_state.selected().unwrap_or(0).min(len - 1);
            app.lists_state.select(Some(index));
            app.input_mode = InputMode::ListManager;
        }
        KeyCode::Char('n' | 'N') | KeyCode::Esc => app.input_mode = InputMode::ListManager,
        _ => {}
    }
}

fn close_input(app: &mut App) {
    app.input.reset();
    app.form = ItemForm::default();
    app.input_mode = InputMode::None;
}

fn filter_title(filter: Filter) -> &'static str {
    match filter {
        Filter::All => "All",
        Filter::Active => "Active",
        Filter::Purchased => "Purchased",
    }
}

fn render_app(frame: &mut Frame, app: &App) {
    let size = frame.size();
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(1),
            Constraint::Length(3),
        ])
        .split(size);

    let state = app.state();
    let titles = Filter::ALL
        .iter()
        .map(|filter| Line::from(Span::raw(filter_title(*filter))))
        .collect::<Vec<_>>();
    let selected = Filter::ALL
        .iter()
        .position(|filter| *filter == state.filter())
        .unwrap_or(0);
    let tabs = Tabs::new(titles)
        .select(selected)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(format!(" {} ", state.current_list().name)),
        )
        .highlight_style(Style::default().add_modifier(Modifier::BOLD).fg(Color::Cyan));
    frame.render_widget(tabs, chunks[0]);

    render_items(frame, chunks[1], app);

    let status = app.status.clone().unwrap_or_default();
    frame.render_widget(
        Paragraph::new(status).style(Style::default().fg(Color::Yellow)),
        chunks[2],
    );

    render_guide_bar(frame, chunks[3], app);

    match &app.input_mode {
        InputMode::None => {}
        InputMode::AddItem => render_item_form(frame, size, app, "Add Item", true),
        InputMode::EditItem(_) => render_item_form(frame, size, app, "Edit Item", false),
        InputMode::Note(category) => {
            render_input_popup(frame, size, &format!("{category} Note"), &app.input);
        }
        InputMode::ListManager => render_list_manager(frame, size, app),
        InputMode::NewList => {
            render_list_manager(frame, size, app);
            render_input_popup(frame, size, "New List", &app.input);
        }
        InputMode::RenameList(_) => {
            render_list_manager(frame, size, app);
            render_input_popup(frame, size, "Rename List", &app.input);
        }
        InputMode::Confirm(id) => {
            render_list_manager(frame, size, app);
            render_confirm_popup(frame, size, app, id);
        }
    }

    if app.show_help {
        render_help_popup(frame, size);
    }
}

fn render_items(frame: &mut Frame, area: Rect, app: &App) {
    let state = app.state();
    let stats = state.stats();
    let title = if stats.total == 0 {
        " Items ".to_string()
    } else {
        format!(" {} left • {} purchased ", stats.remaining, stats.done)
    };
    let block = Block::default().borders(Borders::ALL).title(title);

    let rows = app.rows();
    if rows.is_empty() {
        let message = match state.filter() {
            Filter::All => "No items yet. Press a to add one.",
            Filter::Active => "Nothing left to buy.",
            Filter::Purchased => "Nothing purchased yet.",
        };
        let empty = Paragraph::new(message)
            .style(Style::default().fg(Color::DarkGray))
            .block(block)
            .wrap(Wrap { trim: true });
        frame.render_widget(empty, area);
        return;
    }

    let list = state.current_list();
    let items = rows
        .iter()
        .map(|row| match row {
            Row::Header(category) => {
                let count = list
                    .items
                    .iter()
                    .filter(|item| item.category == *category)
                    .count();
                let marker = if state.is_group_expanded(*category) { "▾" } else { "▸" };
                let mut spans = vec![Span::styled(
                    format!("{marker} {category} ({count})"),
                    Style::default().add_modifier(Modifier::BOLD).fg(Color::Cyan),
                )];
                if state.has_note(*category) {
                    spans.push(Span::styled(" ✎", Style::default().fg(Color::Yellow)));
                }
                ListItem::new(Line::from(spans))
            }
            Row::Note(category) => {
                let line = match list.note(*category).filter(|_| state.has_note(*category)) {
                    Some(note) => format!("    {}", note.replace('\n', " ")),
                    None => "    (no note, press e to write one)".to_string(),
                };
                ListItem::new(line).style(
                    Style::default()
                        .fg(Color::Yellow)
                        .add_modifier(Modifier::ITALIC),
                )
            }
            Row::Item(id, _) => match list.item(id) {
                Some(item) => render_item_row(state, item),
                None => ListItem::new(""),
            },
        })
        .collect::<Vec<_>>();

    let widget = List::new(items)
        .block(block)
        .highlight_style(Style::default().bg(Color::DarkGray))
        .highlight_symbol("> ");
    frame.render_stateful_widget(widget, area, &mut app.rows_state.clone());
}

fn render_item_row<'a>(state: &Snapshot, item: &'a Item) -> ListItem<'a> {
    let mark = if item.purchased { "[x]" } else { "[ ]" };
    let prefix = if state.dragged_item_id() == Some(&item.id) {
        "↕ "
    } else if state.drag_over_item_id() == Some(&item.id) {
        "→ "
    } else {
        "  "
    };
    let mut name_style = Style::default();
    if item.purchased {
        name_style = name_style
            .fg(Color::DarkGray)
            .add_modifier(Modifier::CROSSED_OUT);
    }
    if state.editing_item_id() == Some(&item.id) {
        name_style = name_style.add_modifier(Modifier::UNDERLINED);
    }
    ListItem::new(Line::from(vec![
        Span::raw(format!("{prefix}{mark} ")),
        Span::styled(item.name.as_str(), name_style),
        Span::styled(
            format!(" ×{}", item.quantity),
            Style::default().fg(Color::Blue),
        ),
    ]))
}

fn render_item_form(frame: &mut Frame, area: Rect, app: &App, title: &str, with_category: bool) {
    let popup_area = centered_rect(60, 40, area);
    frame.render_widget(Clear, popup_area);
    let block = Block::default().borders(Borders::ALL).title(title.to_string());

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Min(0),
        ])
        .margin(1)
        .split(popup_area);

    let focused = |field: FormField| {
        if app.form.field == field {
            Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        }
    };

    let name = Paragraph::new(app.input.content.as_str()).block(
        Block::default()
            .borders(Borders::ALL)
            .title("Name")
            .border_style(focused(FormField::Name)),
    );
    frame.render_widget(name, chunks[0]);

    frame.render_widget(
        Paragraph::new(format!("Quantity: {}", app.form.quantity))
            .style(focused(FormField::Quantity)),
        chunks[1],
    );
    if with_category {
        frame.render_widget(
            Paragraph::new(format!("Category: {}", app.form.category))
                .style(focused(FormField::Category)),
            chunks[2],
        );
    }

    let help = Paragraph::new("Tab: Next field | ↑/↓: Change | Enter: Save | Esc: Cancel")
        .style(Style::default().fg(Color::DarkGray))
        .wrap(Wrap { trim: true });
    frame.render_widget(help, chunks[3]);

    if app.form.field == FormField::Name {
        let cx = chunks[0].x + 1 + app.input.column().min(chunks[0].width.saturating_sub(3));
        frame.set_cursor(cx, chunks[0].y + 1);
    }

    frame.render_widget(block, popup_area);
}

fn render_input_popup(frame: &mut Frame, area: Rect, title: &str, input_data: &TextInput) {
    let popup_area = centered_rect(60, 20, area);
    frame.render_widget(Clear, popup_area);
    let block = Block::default().borders(Borders::ALL).title(title.to_string());

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(0)])
        .margin(1)
        .split(popup_area);

    let input_widget =
        Paragraph::new(input_data.content.as_str()).block(Block::default().borders(Borders::ALL));
    frame.render_widget(input_widget, chunks[0]);

    let cx = chunks[0].x + 1 + input_data.column().min(chunks[0].width.saturating_sub(3));
    frame.set_cursor(cx, chunks[0].y + 1);

    let help = Paragraph::new("Enter: Save | Esc: Cancel")
        .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(help, chunks[1]);

    frame.render_widget(block, popup_area);
}

fn render_list_manager(frame: &mut Frame, area: Rect, app: &App) {
    let popup_area = centered_rect(60, 50, area);
    frame.render_widget(Clear, popup_area);

    let items = app
        .state()
        .list_summaries()
        .into_iter()
        .map(|summary| {
            let marker = if summary.is_current { "● " } else { "  " };
            ListItem::new(format!(
                "{marker}{} ({} items)",
                summary.name, summary.item_count
            ))
        })
        .collect::<Vec<_>>();

    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title("Lists"))
        .highlight_style(Style::default().bg(Color::DarkGray));
    frame.render_stateful_widget(list, popup_area, &mut app.lists_state.clone());
}

fn render_confirm_popup(frame: &mut Frame, area: Rect, app: &App, id: &ListId) {
    let popup_area = centered_rect(60, 30, area);
    frame.render_widget(Clear, popup_area);
    let block = Block::default().borders(Borders::ALL).title("Confirm Delete");

    let name = app
        .state()
        .lists()
        .iter()
        .find(|list| &list.id == id)
        .map_or("this list", |list| list.name.as_str());

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(2), Constraint::Length(1)])
        .margin(1)
        .split(popup_area);

    let text = Paragraph::new(format!("Delete {name} and all of its items?"))
        .wrap(Wrap { trim: true });
    frame.render_widget(text, chunks[0]);

    let help = Paragraph::new("y: Confirm | n/Esc: Cancel")
        .style(Style::default().fg(Color::DarkGray));
    frame.render_widget(help, chunks[1]);

    frame.render_widget(block, popup_area);
}

fn render_guide_bar(frame: &mut Frame, area: Rect, app: &App) {
    let hints = get_key_hints(app);
    let spans: Vec<Span> = hints
        .iter()
        .flat_map(|(key, desc)| {
            vec![
                Span::styled(
                    format!(" [{key}] "),
                    Style::default().add_modifier(Modifier::BOLD).fg(Color::Cyan),
                ),
                Span::raw(format!("{desc}  ")),
            ]
        })
        .collect();

    let guide = Paragraph::new(Line::from(spans))
        .block(Block::default().borders(Borders::ALL).title("Guide"));
    frame.render_widget(guide, area);
}

fn get_key_hints(app: &App) -> Vec<(&'static str, &'static str)> {
    match app.input_mode {
        InputMode::AddItem | InputMode::EditItem(_) => {
            return vec![("Enter", "Save"), ("Tab", "Field"), ("Esc", "Cancel")];
        }
        InputMode::Note(_) | InputMode::NewList | InputMode::RenameList(_) => {
            return vec![("Enter", "Save"), ("Esc", "Cancel")];
        }
        InputMode::ListManager => {
            return vec![
                ("Enter", "Open"),
                ("c", "New"),
                ("r", "Rename"),
                ("d", "Delete"),
                ("Esc", "Close"),
            ];
        }
        InputMode::Confirm(_) => return vec![("y", "Confirm"), ("n", "Cancel")],
        InputMode::None => {}
    }
    if app.show_help {
        return vec![("any", "Close Help")];
    }
    if app.state().dragged_item_id().is_some() {
        return vec![("↑/↓", "Target"), ("m", "Drop"), ("Esc", "Cancel")];
    }

    let mut hints = vec![("q", "Quit"), ("?", "Help"), ("a", "Add"), ("Tab", "Filter")];
    match app.selected_row() {
        Some(Row::Item(..)) => hints.extend_from_slice(&[
            ("Space", "Toggle"),
            ("e", "Edit"),
            ("d", "Delete"),
            ("J/K", "Move"),
        ]),
        Some(Row::Header(_)) => hints.push(("Enter", "Notes")),
        Some(Row::Note(_)) => hints.push(("Enter", "Edit Note")),
        None => {}
    }
    hints.push(("l", "Lists"));
    hints
}

fn render_help_popup(frame: &mut Frame, area: Rect) {
    let popup_area = centered_rect(70, 60, area);
    frame.render_widget(Clear, popup_area);
    let block = Block::default().borders(Borders::ALL).title("Help");
    let help = Paragraph::new(help_text())
        .block(block)
        .wrap(Wrap { trim: true });
    frame.render_widget(help, popup_area);
}

fn help_text() -> &'static str {
    "a: add item\nspace/x: toggle purchased\ne/enter: edit item or note\nd: delete item\n\
     J/K: move item down/up\nm: pick up item, m again to drop\nn: show/hide group note\n\
     tab, 1-3: switch filter\n[ ]: previous/next list\nl: manage lists\nq: quit"
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);
    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

fn restore_terminal(
    mut terminal: Terminal<ratatui::backend::CrosstermBackend<Stdout>>,
) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use gl_core::{FixedClock, SequentialIds};
    use ratatui::backend::TestBackend;

    fn app() -> App {
        App::new(Store::new(
            Vec::new(),
            Box::new(SequentialIds::new("id")),
            Box::new(FixedClock(Utc.timestamp_millis_opt(0).unwrap())),
        ))
    }

    fn press(app: &mut App, code: KeyCode) -> bool {
        handle_key(app, KeyEvent::new(code, KeyModifiers::NONE))
    }

    fn type_text(app: &mut App, text: &str) {
        for c in text.chars() {
            press(app, KeyCode::Char(c));
        }
    }

    fn names(app: &App) -> Vec<String> {
        app.state()
            .current_list()
            .items
            .iter()
            .map(|item| item.name.clone())
            .collect()
    }

    fn render(app: &App) -> String {
        let backend = TestBackend::new(70, 24);
        let mut terminal = Terminal::new(backend).expect("terminal");
        terminal
            .draw(|frame| render_app(frame, app))
            .expect("render");
        buffer_to_string(terminal.backend().buffer())
    }

    fn buffer_to_string(buffer: &ratatui::buffer::Buffer) -> String {
        let mut lines = Vec::new();
        for y in 0..buffer.area.height {
            let mut line = String::new();
            for x in 0..buffer.area.width {
                let cell = buffer.get(x, y);
                line.push_str(cell.symbol());
            }
            lines.push(line.trim_end().to_string());
        }
        lines.join("\n")
    }

    #[test]
    fn renders_groups_and_stats() {
        let mut app = app();
        let milk = app.store.add_item("Milk", 2, Category::Dairy).unwrap();
        app.store.add_item("Apples", 6, Category::Produce).unwrap();
        let _ = app.store.toggle_item(&milk);
        app.clamp_selection();

        let screen = render(&app);
        assert!(screen.contains("My Grocery List"));
        assert!(screen.contains("1 left • 1 purchased"));
        assert!(screen.contains("Produce (1)"));
        assert!(screen.contains("Dairy (1)"));
        assert!(screen.contains("[x] Milk ×2"));
        assert!(!screen.contains("Bakery"));
    }

    #[test]
    fn empty_list_shows_a_hint() {
        let app = app();
        let screen = render(&app);
        assert!(screen.contains("No items yet."));
        assert!(screen.contains(" Items "));
        assert!(!screen.contains("purchased"));
    }

    #[test]
    fn notes_keep_surrounding_whitespace() {
        let mut app = app();
        app.store.add_item("Milk", 1, Category::Dairy).unwrap();
        app.clamp_selection();

        press(&mut app, KeyCode::Enter);
        press(&mut app, KeyCode::Down);
        press(&mut app, KeyCode::Enter);
        type_text(&mut app, "  oat  ");
        press(&mut app, KeyCode::Enter);
        assert_eq!(app.state().current_list().note(Category::Dairy), Some("  oat  "));

        press(&mut app, KeyCode::Enter);
        for _ in 0..7 {
            press(&mut app, KeyCode::Backspace);
        }
        type_text(&mut app, "   ");
        press(&mut app, KeyCode::Enter);
        assert_eq!(app.state().current_list().note(Category::Dairy), Some("   "));
        assert!(!app.state().has_note(Category::Dairy));
        assert!(render(&app).contains("(no note, press e to write one)"));
    }

    #[test]
    fn add_form_creates_items() {
        let mut app = app();
        press(&mut app, KeyCode::Char('a'));
        assert_eq!(app.input_mode, InputMode::AddItem);
        type_text(&mut app, "Eggs");
        press(&mut app, KeyCode::Tab);
        press(&mut app, KeyCode::Up);
        press(&mut app, KeyCode::Up);
        press(&mut app, KeyCode::Tab);
        press(&mut app, KeyCode::Up);
        assert!(render(&app).contains("Category: Meat"));
        press(&mut app, KeyCode::Enter);

        let item = &app.state().current_list().items[0];
        assert_eq!(item.name, "Eggs");
        assert_eq!(item.quantity, 3);
        assert_eq!(item.category, Category::Meat);
        assert_eq!(app.input_mode, InputMode::None);
        assert_eq!(app.selected_item(), Some(item.id.clone()));
    }

    #[test]
    fn blank_add_is_rejected() {
        let mut app = app();
        press(&mut app, KeyCode::Char('a'));
        type_text(&mut app, "   ");
        press(&mut app, KeyCode::Enter);
        assert!(app.state().current_list().items.is_empty());
        assert_eq!(app.status.as_deref(), Some("Item name cannot be blank"));
    }

    #[test]
    fn toggle_and_filter_tabs() {
        let mut app = app();
        app.store.add_item("Tea", 1, Category::Beverages).unwrap();
        app.clamp_selection();
        press(&mut app, KeyCode::Down);
        press(&mut app, KeyCode::Char(' '));
        assert!(app.state().current_list().items[0].purchased);

        press(&mut app, KeyCode::Tab);
        assert_eq!(app.state().filter(), Filter::Active);
        assert!(render(&app).contains("Nothing left to buy."));

        press(&mut app, KeyCode::Char('3'));
        assert_eq!(app.state().filter(), Filter::Purchased);
        press(&mut app, KeyCode::BackTab);
        assert_eq!(app.state().filter(), Filter::Active);
    }

    #[test]
    fn editing_items_in_place() {
        let mut app = app();
        let id = app.store.add_item("Chese", 1, Category::Dairy).unwrap();
        app.clamp_selection();
        press(&mut app, KeyCode::Down);
        press(&mut app, KeyCode::Char('e'));
        assert_eq!(app.state().editing_item_id(), Some(&id));

        press(&mut app, KeyCode::Left);
        press(&mut app, KeyCode::Left);
        press(&mut app, KeyCode::Char('e'));
        press(&mut app, KeyCode::Tab);
        press(&mut app, KeyCode::Up);
        press(&mut app, KeyCode::Enter);

        let item = app.item(&id).unwrap();
        assert_eq!(item.name, "Cheese");
        assert_eq!(item.quantity, 2);
        assert_eq!(app.state().editing_item_id(), None);
    }

    #[test]
    fn clearing_the_name_removes_the_item() {
        let mut app = app();
        app.store.add_item("Rice", 1, Category::Pantry).unwrap();
        app.clamp_selection();
        press(&mut app, KeyCode::Down);
        press(&mut app, KeyCode::Enter);
        for _ in 0..4 {
            press(&mut app, KeyCode::Backspace);
        }
        press(&mut app, KeyCode::Enter);
        assert!(app.state().current_list().items.is_empty());
        assert_eq!(app.status.as_deref(), Some("Removed item"));
    }

    #[test]
    fn shifting_moves_within_a_group() {
        let mut app = app();
        app.store.add_item("c", 1, Category::Other).unwrap();
        app.store.add_item("b", 1, Category::Other).unwrap();
        app.store.add_item("a", 1, Category::Other).unwrap();
        app.clamp_selection();

        press(&mut app, KeyCode::Down);
        press(&mut app, KeyCode::Char('J'));
        assert_eq!(names(&app), ["b", "a", "c"]);
        assert_eq!(app.rows_state.selected(), Some(2));

        press(&mut app, KeyCode::Char('K'));
        assert_eq!(names(&app), ["a", "b", "c"]);
        press(&mut app, KeyCode::Char('K'));
        assert_eq!(names(&app), ["a", "b", "c"]);
    }

    #[test]
    fn dragging_drops_onto_the_hovered_item() {
        let mut app = app();
        app.store.add_item("c", 1, Category::Other).unwrap();
        app.store.add_item("b", 1, Category::Other).unwrap();
        app.store.add_item("a", 1, Category::Other).unwrap();
        app.clamp_selection();

        press(&mut app, KeyCode::Down);
        press(&mut app, KeyCode::Char('m'));
        assert!(app.state().dragged_item_id().is_some());
        press(&mut app, KeyCode::Down);
        press(&mut app, KeyCode::Down);
        assert!(render(&app).contains("→ [ ] c"));
        press(&mut app, KeyCode::Char('m'));

        assert_eq!(names(&app), ["b", "c", "a"]);
        assert_eq!(app.state().dragged_item_id(), None);
        assert_eq!(app.state().drag_over_item_id(), None);
    }

    #[test]
    fn escape_cancels_a_drag() {
        let mut app = app();
        app.store.add_item("b", 1, Category::Other).unwrap();
        app.store.add_item("a", 1, Category::Other).unwrap();
        app.clamp_selection();
        press(&mut app, KeyCode::Down);
        press(&mut app, KeyCode::Char('m'));
        press(&mut app, KeyCode::Down);
        press(&mut app, KeyCode::Esc);
        assert_eq!(names(&app), ["a", "b"]);
        assert_eq!(app.state().dragged_item_id(), None);
    }

    #[test]
    fn notes_are_edited_from_expanded_groups() {
        let mut app = app();
        app.store.add_item("Milk", 1, Category::Dairy).unwrap();
        app.clamp_selection();

        press(&mut app, KeyCode::Enter);
        assert!(app.state().is_group_expanded(Category::Dairy));
        assert!(render(&app).contains("(no note, press e to write one)"));

        press(&mut app, KeyCode::Down);
        press(&mut app, KeyCode::Enter);
        assert_eq!(app.input_mode, InputMode::Note(Category::Dairy));
        type_text(&mut app, "oat if out");
        press(&mut app, KeyCode::Enter);

        assert_eq!(app.state().current_list().note(Category::Dairy), Some("oat if out"));
        let screen = render(&app);
        assert!(screen.contains("Dairy (1) ✎"));
        assert!(screen.contains("oat if out"));

        press(&mut app, KeyCode::Char('n'));
        assert!(!app.state().is_group_expanded(Category::Dairy));
    }

    #[test]
    fn list_manager_creates_switches_and_deletes() {
        let mut app = app();
        press(&mut app, KeyCode::Char('l'));
        press(&mut app, KeyCode::Char('d'));
        assert_eq!(app.status.as_deref(), Some("Cannot delete the last list"));

        press(&mut app, KeyCode::Char('c'));
        type_text(&mut app, "Party");
        press(&mut app, KeyCode::Enter);
        assert_eq!(app.state().current_list().name, "Party");
        assert_eq!(app.input_mode, InputMode::None);

        press(&mut app, KeyCode::Char('['));
        assert_eq!(app.state().current_list().name, "My Grocery List");

        press(&mut app, KeyCode::Char('l'));
        press(&mut app, KeyCode::Down);
        press(&mut app, KeyCode::Char('r'));
        for _ in 0.."Party".len() {
            press(&mut app, KeyCode::Backspace);
        }
        type_text(&mut app, "BBQ");
        press(&mut app, KeyCode::Enter);
        assert_eq!(app.state().lists()[1].name, "BBQ");

        press(&mut app, KeyCode::Char('d'));
        assert!(render(&app).contains("Delete BBQ"));
        press(&mut app, KeyCode::Char('y'));
        assert_eq!(app.state().lists().len(), 1);
        assert_eq!(app.input_mode, InputMode::ListManager);
        press(&mut app, KeyCode::Esc);
        assert_eq!(app.input_mode, InputMode::None);
    }

    #[test]
    fn quit_and_help() {
        let mut app = app();
        assert!(!press(&mut app, KeyCode::Char('?')));
        assert!(render(&app).contains("J/K: move item down/up"));
        assert!(!press(&mut app, KeyCode::Char('q')));
        assert!(press(&mut app, KeyCode::Char('q')));
    }

    #[test]
    fn text_input_handles_multibyte_characters() {
        let mut input = TextInput::default();
        for c in "Crème".chars() {
            input.insert(c);
        }
        input.move_left();
        input.move_left();
        input.delete_back();
        assert_eq!(input.content, "Crme");
        assert_eq!(input.column(), 2);
    }
}
