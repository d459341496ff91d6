//! TallyPrime request envelopes
//!
//! Every request goes to the same endpoint; the HEADER/TALLYREQUEST element
//! and the report name decide what Tally does with it. Text and attribute
//! values are escaped by quick-xml (`< > & ' "`); amounts are written as
//! pre-formatted decimal text.

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::domain::{format_amount, PendingDocument};
use crate::error::{Result, SyncError};

fn xml<E: std::fmt::Display>(e: E) -> SyncError {
    SyncError::Xml(e.to_string())
}

/// Thin event writer so envelope builders read like the XML they emit
struct EnvelopeWriter {
    wr: Writer<Vec<u8>>,
}

impl EnvelopeWriter {
    fn new() -> Self {
        Self {
            wr: Writer::new_with_indent(Vec::new(), b' ', 2),
        }
    }

    fn open(&mut self, tag: &str) -> Result<&mut Self> {
        self.wr
            .write_event(Event::Start(BytesStart::new(tag)))
            .map_err(xml)?;
        Ok(self)
    }

    fn open_with(&mut self, tag: &str, attrs: &[(&str, &str)]) -> Result<&mut Self> {
        let mut start = BytesStart::new(tag);
        for attr in attrs {
            start.push_attribute(*attr);
        }
        self.wr.write_event(Event::Start(start)).map_err(xml)?;
        Ok(self)
    }

    fn close(&mut self, tag: &str) -> Result<&mut Self> {
        self.wr
            .write_event(Event::End(BytesEnd::new(tag)))
            .map_err(xml)?;
        Ok(self)
    }

    /// `<tag>text</tag>` with `text` escaped
    fn leaf(&mut self, tag: &str, text: &str) -> Result<&mut Self> {
        self.open(tag)?;
        self.wr
            .write_event(Event::Text(BytesText::new(text)))
            .map_err(xml)?;
        self.close(tag)
    }

    fn leaf_with(&mut self, tag: &str, attrs: &[(&str, &str)], text: &str) -> Result<&mut Self> {
        self.open_with(tag, attrs)?;
        self.wr
            .write_event(Event::Text(BytesText::new(text)))
            .map_err(xml)?;
        self.close(tag)
    }

    /// `<tag>text</tag>` for numeric text that needs no escaping
    fn number(&mut self, tag: &str, text: &str) -> Result<&mut Self> {
        self.open(tag)?;
        self.wr
            .write_event(Event::Text(BytesText::from_escaped(text)))
            .map_err(xml)?;
        self.close(tag)
    }

    fn finish(self) -> Result<String> {
        String::from_utf8(self.wr.into_inner()).map_err(xml)
    }
}

/// Import header shared by master and voucher imports
fn open_import(w: &mut EnvelopeWriter, report: &str, company: &str) -> Result<()> {
    w.open("ENVELOPE")?
        .open("HEADER")?
        .leaf("TALLYREQUEST", "Import Data")?
        .close("HEADER")?
        .open("BODY")?
        .open("IMPORTDATA")?
        .open("REQUESTDESC")?
        .leaf("REPORTNAME", report)?
        .open("STATICVARIABLES")?
        .leaf("SVCURRENTCOMPANY", company)?
        .close("STATICVARIABLES")?
        .close("REQUESTDESC")?
        .open("REQUESTDATA")?
        .open_with("TALLYMESSAGE", &[("xmlns:UDF", "TallyUDF")])?;
    Ok(())
}

fn close_import(w: &mut EnvelopeWriter) -> Result<()> {
    w.close("TALLYMESSAGE")?
        .close("REQUESTDATA")?
        .close("IMPORTDATA")?
        .close("BODY")?
        .close("ENVELOPE")?;
    Ok(())
}

/// Export of the built-in "List of Companies" collection
pub fn list_companies() -> Result<String> {
    let mut w = EnvelopeWriter::new();
    w.open("ENVELOPE")?
        .open("HEADER")?
        .leaf("VERSION", "1")?
        .leaf("TALLYREQUEST", "Export")?
        .leaf("TYPE", "Collection")?
        .leaf("ID", "List of Companies")?
        .close("HEADER")?
        .open("BODY")?
        .open("DESC")?
        .open("STATICVARIABLES")?
        .leaf("SVIsSimpleCompany", "No")?
        .close("STATICVARIABLES")?
        .open("TDL")?
        .open("TDLMESSAGE")?
        .open_with(
            "COLLECTION",
            &[("NAME", "List of Companies"), ("ISINITIALIZE", "Yes")],
        )?
        .leaf("TYPE", "Company")?
        .leaf("NATIVEMETHOD", "Name")?
        .close("COLLECTION")?
        .close("TDLMESSAGE")?
        .close("TDL")?
        .close("DESC")?
        .close("BODY")?
        .close("ENVELOPE")?;
    w.finish()
}

/// Master import creating one ledger under `group`
pub fn create_ledger(company: &str, name: &str, group: &str) -> Result<String> {
    let mut w = EnvelopeWriter::new();
    open_import(&mut w, "All Masters", company)?;
    w.open_with("LEDGER", &[("NAME", name), ("ACTION", "Create")])?
        .open("NAME.LIST")?
        .leaf("NAME", name)?
        .close("NAME.LIST")?
        .leaf("PARENT", group)?
        .leaf("ISBILLWISEON", "No")?
        .leaf("AFFECTSSTOCK", "No")?
        .close("LEDGER")?;
    close_import(&mut w)?;
    w.finish()
}

fn ledger_entry(w: &mut EnvelopeWriter, ledger: &str, deemed_positive: bool, amount: &str) -> Result<()> {
    w.open("ALLLEDGERENTRIES.LIST")?
        .leaf("LEDGERNAME", ledger)?
        .leaf("ISDEEMEDPOSITIVE", if deemed_positive { "Yes" } else { "No" })?
        .number("AMOUNT", amount)?
        .close("ALLLEDGERENTRIES.LIST")?;
    Ok(())
}

/// Sales voucher import keyed by the document's remote id
///
/// `ACTION="Alter"` makes Tally create the voucher when the remote id is
/// unknown and update it otherwise, so re-sending a document is safe.
pub fn alter_sales_voucher(company: &str, doc: &PendingDocument) -> Result<String> {
    let mut w = EnvelopeWriter::new();
    open_import(&mut w, "Vouchers", company)?;
    w.open_with(
        "VOUCHER",
        &[
            ("REMOTEID", doc.remote_id.as_str()),
            ("VCHTYPE", "Sales"),
            ("ACTION", "Alter"),
        ],
    )?
    .leaf("GUID", &doc.remote_id)?
    .leaf("DATE", &doc.date)?
    .leaf("VOUCHERTYPENAME", "Sales")?
    .leaf("VOUCHERNUMBER", &doc.document_number)?
    .leaf("PARTYLEDGERNAME", &doc.party.name)?
    .leaf("NARRATION", doc.narration.as_deref().unwrap_or_default())?
    .leaf("PERSISTEDVIEW", "Accounting Voucher View")?;

    // Party is debited with the full invoice value
    ledger_entry(&mut w, &doc.party.name, true, &format_amount(doc.party_amount()?))?;
    for item in &doc.line_items {
        ledger_entry(&mut w, &item.ledger_name, false, &format_amount(item.amount))?;
    }
    for (tax, amount) in doc.taxes.iter() {
        ledger_entry(&mut w, tax, false, &format_amount(amount))?;
    }

    w.close("VOUCHER")?;
    close_import(&mut w)?;
    w.finish()
}

/// Export with an inline TDL collection of vouchers whose RemoteID matches
pub fn voucher_exists(company: &str, remote_id: &str) -> Result<String> {
    if remote_id.contains('"') {
        return Err(SyncError::Validation(
            "remote id must not contain '\"'".to_string(),
        ));
    }
    let formula = format!("$RemoteID = \"{}\"", remote_id);

    let mut w = EnvelopeWriter::new();
    w.open("ENVELOPE")?
        .open("HEADER")?
        .leaf("TALLYREQUEST", "Export Data")?
        .close("HEADER")?
        .open("BODY")?
        .open("EXPORTDATA")?
        .open("REQUESTDESC")?
        .leaf("REPORTNAME", "VoucherCheck")?
        .open("STATICVARIABLES")?
        .leaf("SVCURRENTCOMPANY", company)?
        .leaf("SVEXPORTFORMAT", "$$SysName:XML")?
        .close("STATICVARIABLES")?
        .close("REQUESTDESC")?
        .open("TDL")?
        .open("TDLMESSAGE")?
        .open_with("REPORT", &[("NAME", "VoucherCheck")])?
        .leaf("FORMS", "VoucherCheckForm")?
        .close("REPORT")?
        .open_with("FORM", &[("NAME", "VoucherCheckForm")])?
        .leaf("PARTS", "VoucherCheckPart")?
        .close("FORM")?
        .open_with("PART", &[("NAME", "VoucherCheckPart")])?
        .leaf("LINES", "VoucherCheckLine")?
        .leaf("REPEAT", "VoucherCheckLine : VoucherCheckCollection")?
        .leaf("SCROLLED", "Vertical")?
        .close("PART")?
        .open_with("LINE", &[("NAME", "VoucherCheckLine")])?
        .leaf("FIELDS", "VoucherRemoteID")?
        .close("LINE")?
        .open_with("FIELD", &[("NAME", "VoucherRemoteID")])?
        .leaf("SET", "$RemoteID")?
        .leaf("XMLTAG", "REMOTEID")?
        .close("FIELD")?
        .open_with("COLLECTION", &[("NAME", "VoucherCheckCollection")])?
        .leaf("TYPE", "Voucher")?
        .leaf("FETCH", "REMOTEID")?
        .leaf("FILTER", "FilterByRemoteID")?
        .close("COLLECTION")?
        .leaf_with(
            "SYSTEM",
            &[("TYPE", "Formulae"), ("NAME", "FilterByRemoteID")],
            &formula,
        )?
        .close("TDLMESSAGE")?
        .close("TDL")?
        .close("EXPORTDATA")?
        .close("BODY")?
        .close("ENVELOPE")?;
    w.finish()
}
