use crate::config::Branding;
use crate::media::{LOGO_PROFILE, MediaSlot, PRODUCT_PROFILE};
use crate::models::LineItem;
use rust_xlsxwriter::{
    Color, Format, FormatAlign, FormatBorder, Image, ObjectMovement, Workbook, Worksheet,
    XlsxError,
};
use thiserror::Error;
use tracing::warn;

const HEADER_ROWS: u32 = 5;
const TABLE_HEADER_ROW: u32 = 6;
const FIRST_DATA_ROW: u32 = TABLE_HEADER_ROW + 1;
const TABLE_HEADERS: [&str; 6] = [
    "Photo",
    "Item No.",
    "Description",
    "Quantity",
    "Unit Price",
    "Amount",
];
const MONEY_FORMAT: &str = "$#,##0.00";
const TABLE_BLUE: u32 = 0x4472C4;

#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("workbook error: {0}")]
    Xlsx(#[from] XlsxError),
    #[error("{images} image slots for {lines} lines")]
    Misaligned { lines: usize, images: usize },
}

/// Everything needed to lay out one quotation sheet.
pub struct QuotationDocument<'a> {
    pub branding: &'a Branding,
    pub logo: &'a MediaSlot,
    pub lines: Vec<LineItem<'a>>,
    pub images: &'a [MediaSlot],
    pub total: f64,
}

struct Formats {
    company: Format,
    info: Format,
    title: Format,
    seller: Format,
    table_header: Format,
    cell_center: Format,
    cell_left: Format,
    money: Format,
    total_label: Format,
    total_value: Format,
}

impl Formats {
    fn new() -> Self {
        let centered = || {
            Format::new()
                .set_align(FormatAlign::Center)
                .set_align(FormatAlign::VerticalCenter)
        };
        let banner = |format: Format| {
            format
                .set_bold()
                .set_background_color(Color::RGB(TABLE_BLUE))
                .set_font_color(Color::White)
                .set_border(FormatBorder::Thin)
        };
        Self {
            company: centered().set_bold().set_font_size(16),
            info: centered().set_font_size(10).set_text_wrap(),
            title: centered().set_font_color(Color::Red).set_font_size(12),
            seller: centered().set_bold(),
            table_header: banner(centered()),
            cell_center: centered().set_border(FormatBorder::Thin),
            cell_left: Format::new()
                .set_align(FormatAlign::Left)
                .set_align(FormatAlign::VerticalCenter)
                .set_text_wrap()
                .set_border(FormatBorder::Thin),
            money: centered()
                .set_num_format(MONEY_FORMAT)
                .set_border(FormatBorder::Thin),
            total_label: banner(
                Format::new()
                    .set_align(FormatAlign::Right)
                    .set_align(FormatAlign::VerticalCenter),
            ),
            total_value: banner(centered().set_num_format(MONEY_FORMAT)),
        }
    }
}

/// Render the quotation into `.xlsx` bytes.
///
/// Absent images become a text fallback; nothing about a single image can
/// fail the document.
pub fn build_workbook(doc: &QuotationDocument<'_>) -> Result<Vec<u8>, DocumentError> {
    if doc.lines.len() != doc.images.len() {
        return Err(DocumentError::Misaligned {
            lines: doc.lines.len(),
            images: doc.images.len(),
        });
    }
    let formats = Formats::new();
    let mut workbook = Workbook::new();
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Quotation")?;
        layout_columns(sheet)?;
        write_header(sheet, doc, &formats)?;
        write_table(sheet, doc, &formats)?;
    }
    Ok(workbook.save_to_buffer()?)
}

fn layout_columns(sheet: &mut Worksheet) -> Result<(), XlsxError> {
    sheet.set_column_width_pixels(0, pixels(PRODUCT_PROFILE.cell.width))?;
    sheet.set_column_width(1, 15)?;
    sheet.set_column_width(2, 45)?;
    sheet.set_column_width(3, 10)?;
    sheet.set_column_width(4, 15)?;
    sheet.set_column_width(5, 15)?;
    Ok(())
}

fn write_header(
    sheet: &mut Worksheet,
    doc: &QuotationDocument<'_>,
    formats: &Formats,
) -> Result<(), XlsxError> {
    // The logo cell spans the five header rows of column A.
    let row_height = LOGO_PROFILE.cell.height / HEADER_ROWS;
    for row in 0..HEADER_ROWS {
        sheet.set_row_height_pixels(row, pixels(row_height))?;
    }

    if !insert_image(sheet, 0, 0, doc.logo)? {
        sheet.write_string_with_format(2, 0, "LOGO ERR", &formats.cell_center)?;
    }

    let branding = doc.branding;
    let header_lines = [
        (&branding.company_name, &formats.company),
        (&branding.address, &formats.info),
        (&branding.contact, &formats.info),
        (&branding.title, &formats.title),
        (&branding.seller, &formats.seller),
    ];
    for (row, (text, format)) in (0u32..).zip(header_lines) {
        sheet.merge_range(row, 1, row, 5, text, format)?;
    }
    Ok(())
}

fn write_table(
    sheet: &mut Worksheet,
    doc: &QuotationDocument<'_>,
    formats: &Formats,
) -> Result<(), XlsxError> {
    for (col, text) in (0u16..).zip(TABLE_HEADERS) {
        sheet.write_string_with_format(TABLE_HEADER_ROW, col, text, &formats.table_header)?;
    }

    let mut row = FIRST_DATA_ROW;
    for (line, slot) in doc.lines.iter().zip(doc.images) {
        sheet.set_row_height_pixels(row, pixels(PRODUCT_PROFILE.cell.height))?;
        if !insert_image(sheet, row, 0, slot)? {
            sheet.write_string_with_format(row, 0, "No Image", &formats.cell_center)?;
        }
        sheet.write_string_with_format(row, 1, line.id, &formats.cell_center)?;
        sheet.write_string_with_format(row, 2, line.description, &formats.cell_left)?;
        sheet.write_number_with_format(row, 3, line.quantity as f64, &formats.cell_center)?;
        sheet.write_number_with_format(row, 4, line.unit_price, &formats.money)?;
        sheet.write_number_with_format(row, 5, line.subtotal, &formats.money)?;
        row += 1;
    }

    sheet.merge_range(row, 0, row, 4, "GRAND TOTAL:", &formats.total_label)?;
    sheet.write_number_with_format(row, 5, doc.total, &formats.total_value)?;
    Ok(())
}

/// Insert the slot's image at its placement. Returns `false` when the caller
/// should write a text fallback instead.
fn insert_image(
    sheet: &mut Worksheet,
    row: u32,
    col: u16,
    slot: &MediaSlot,
) -> Result<bool, XlsxError> {
    let (Some(processed), Some(placement)) = (slot.result.image(), slot.placement) else {
        return Ok(false);
    };
    let image = match Image::new_from_buffer(&processed.png) {
        Ok(image) => image.set_object_movement(ObjectMovement::MoveAndSizeWithCells),
        Err(err) => {
            warn!(
                target = "quotation.document",
                row,
                error = %err,
                "image_rejected_by_workbook"
            );
            return Ok(false);
        }
    };
    sheet.insert_image_with_offset(row, col, &image, placement.x_offset, placement.y_offset)?;
    Ok(true)
}

fn pixels(value: u32) -> u16 {
    u16::try_from(value).unwrap_or(u16::MAX)
}
