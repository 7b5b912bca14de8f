use std::collections::HashMap;

use crate::model::{BlockType, ClauseDraft, ServiceModel, CONDITION_JURISDICTION};

use super::classify::{Classification, HierarchyClassifier};
use super::conditions::{ConditionScanner, ParserContext};
use super::normalize::{ParagraphNormalizer, StyledParagraph};
use super::template::derive_template;
use super::tree::{DecomposedDocument, TreeBuilder};

fn styled(paragraphs: &[(&str, &str)]) -> Vec<StyledParagraph> {
    paragraphs
        .iter()
        .map(|(style, text)| StyledParagraph {
            style: (*style).to_string(),
            text: (*text).to_string(),
        })
        .collect()
}

fn decompose(paragraphs: &[(&str, &str)]) -> DecomposedDocument {
    let normalizer = ParagraphNormalizer::new().expect("normalizer builds");
    let stream = normalizer.normalize(&styled(paragraphs));

    let mut builder = TreeBuilder::new().expect("builder builds");
    for paragraph in &stream.paragraphs {
        builder.push_paragraph(paragraph);
    }
    builder.finish()
}

fn classify_one(style: &str, text: &str) -> Classification {
    let normalizer = ParagraphNormalizer::new().expect("normalizer builds");
    let stream = normalizer.normalize(&styled(&[(style, text)]));
    let classifier = HierarchyClassifier::new().expect("classifier builds");
    classifier.classify(&stream.paragraphs[0])
}

fn by_code<'a>(document: &'a DecomposedDocument, code: &str) -> &'a ClauseDraft {
    document
        .clauses
        .iter()
        .find(|clause| clause.code == code)
        .unwrap_or_else(|| panic!("no clause with code {code}"))
}

#[test]
fn normalizer_drops_notes_and_lifts_numbering() {
    let normalizer = ParagraphNormalizer::new().expect("normalizer builds");
    let stream = normalizer.normalize(&styled(&[
        ("Comment", "internal review remark"),
        ("Normal", "NOTE TO DRAFTER: confirm deposit amount"),
        ("Normal", "3.2 Purchase Price shall be paid at closing."),
        ("Normal", ""),
    ]));

    assert_eq!(stream.ignored_count, 2);
    assert_eq!(stream.paragraphs.len(), 1);
    assert_eq!(stream.paragraphs[0].numbering.as_deref(), Some("3.2"));
    assert!(stream.paragraphs[0].text.starts_with("Purchase Price"));
    assert_eq!(stream.numbering_stripped_count, 1);
}

#[test]
fn normalizer_keeps_years_and_list_markers_in_text() {
    let normalizer = ParagraphNormalizer::new().expect("normalizer builds");
    let stream = normalizer.normalize(&styled(&[
        ("Normal", "2025 assessments remain the Buyer's responsibility."),
        ("Normal", "i. deliver the finished unit"),
    ]));

    assert!(stream.paragraphs[0].numbering.is_none());
    assert!(stream.paragraphs[0].text.starts_with("2025 assessments"));
    assert!(stream.paragraphs[1].numbering.is_none());
    assert!(stream.paragraphs[1].text.starts_with("i."));
}

#[test]
fn style_table_maps_headings_to_levels() {
    assert_eq!(
        classify_one("Heading 1", "Purchase Agreement"),
        Classification {
            block_type: BlockType::Section,
            level: 1
        }
    );
    assert_eq!(
        classify_one("Heading 2", "General Terms"),
        Classification {
            block_type: BlockType::Section,
            level: 2
        }
    );
    assert_eq!(classify_one("Heading 5", "bullet text").block_type, BlockType::ListItem);
    assert_eq!(classify_one("Heading 5", "bullet text").level, 7);
    assert_eq!(
        classify_one("Heading 6", "LIMITATION OF LIABILITY APPLIES").block_type,
        BlockType::Conspicuous
    );
}

#[test]
fn roman_list_prefix_wins_over_heading_style() {
    let classified = classify_one("Heading 3", "ii. install all fixtures");
    assert_eq!(classified.block_type, BlockType::ListItem);
    assert_eq!(classified.level, 7);
}

#[test]
fn table_placeholder_forces_table_block() {
    let classified = classify_one("Heading 2", "{{PRICING_BREAKDOWN_TABLE}}");
    assert_eq!(classified.block_type, BlockType::Table);

    // An unknown placeholder is just a variable, not a table slot.
    let other = classify_one("Normal", "{{SOME_VARIABLE}} applies here.");
    assert_eq!(other.block_type, BlockType::Paragraph);
}

#[test]
fn text_heuristics_cover_weak_styles() {
    assert_eq!(
        classify_one("Normal", "ARTICLE IV — REPRESENTATIONS"),
        Classification {
            block_type: BlockType::Section,
            level: 1
        }
    );
    assert_eq!(
        classify_one("Normal", "1.2 Payment of the Purchase Price is due at closing.").level,
        3
    );
    assert_eq!(
        classify_one("Normal", "1.2.3 Deposit handling instructions follow.").level,
        4
    );
    assert_eq!(
        classify_one("Normal", "DISPUTE RESOLUTION"),
        Classification {
            block_type: BlockType::Section,
            level: 1
        }
    );
    assert_eq!(
        classify_one("Normal", "Closing Conditions:").block_type,
        BlockType::Clause
    );
    assert_eq!(
        classify_one("Normal", "The parties agree to the following terms.").block_type,
        BlockType::Paragraph
    );
}

#[test]
fn scanner_repairs_known_malformed_markers() {
    let scanner = ConditionScanner::new().expect("scanner builds");
    let (repaired, count) = scanner.repair_markers("See [STATE DISCLOSURE:CA_LIEN] for details");

    assert_eq!(count, 1);
    let markers = scanner.scan(&repaired);
    assert_eq!(markers.disclosure_code.as_deref(), Some("CA_LIEN"));
}

#[test]
fn scanner_leaves_unrepairable_tags_as_literal_text() {
    let scanner = ConditionScanner::new().expect("scanner builds");
    let (repaired, count) = scanner.repair_markers("See [STATE_DISC:CA_LIEN] for details");

    assert_eq!(count, 0);
    assert!(repaired.contains("[STATE_DISC:CA_LIEN]"));
    assert!(scanner.scan(&repaired).disclosure_code.is_none());
}

#[test]
fn scanner_detects_jurisdiction_phrases() {
    let scanner = ConditionScanner::new().expect("scanner builds");

    assert_eq!(
        scanner.scan("California Provisions").jurisdiction.as_deref(),
        Some("CA")
    );
    assert_eq!(
        scanner.scan("Texas Specific Terms").jurisdiction.as_deref(),
        Some("TX")
    );
    assert_eq!(scanner.scan("Nevada").jurisdiction.as_deref(), Some("NV"));
    assert!(scanner
        .scan("California law governs this Agreement.")
        .jurisdiction
        .is_none());
}

#[test]
fn scanner_requires_exclusive_service_model_keyword() {
    let scanner = ConditionScanner::new().expect("scanner builds");

    assert_eq!(
        scanner.scan("This CRC addendum applies.").service_model,
        Some(ServiceModel::Crc)
    );
    assert_eq!(
        scanner.scan("CMOS delivery schedule").service_model,
        Some(ServiceModel::Cmos)
    );
    assert!(scanner
        .scan("Choose either CRC or CMOS at signing.")
        .service_model
        .is_none());
}

#[test]
fn exhibit_headers_match_loose_and_strict_forms() {
    let scanner = ConditionScanner::new().expect("scanner builds");

    let strict = scanner.scan("EXHIBIT B — Warranty Terms");
    let header = strict.exhibit.expect("header detected");
    assert_eq!(header.letter, 'B');
    assert!(header.strict_match);

    let loose = scanner.scan("exhibit b warranty terms");
    let header = loose.exhibit.expect("header detected");
    assert_eq!(header.letter, 'B');
    assert!(!header.strict_match);
}

#[test]
fn parser_context_resets_follow_boundary_rules() {
    let scanner = ConditionScanner::new().expect("scanner builds");
    let ctx = ParserContext::default();

    let ctx = ctx.observing(&scanner.scan("California Provisions"));
    let ctx = ctx.observing(&scanner.scan("All CRC projects include this."));
    assert_eq!(ctx.jurisdiction.as_deref(), Some("CA"));
    assert_eq!(ctx.service_model, Some(ServiceModel::Crc));

    // Level-1 boundary clears the service model but not the jurisdiction.
    let ctx = ctx.at_section_boundary();
    assert_eq!(ctx.jurisdiction.as_deref(), Some("CA"));
    assert!(ctx.service_model.is_none());

    // A differently-lettered exhibit clears the jurisdiction.
    let ctx = ctx.entering_exhibit('B');
    assert!(ctx.jurisdiction.is_none());

    // Re-entering the same letter keeps it.
    let ctx = ctx.observing(&scanner.scan("Texas Provisions"));
    let ctx = ctx.entering_exhibit('B');
    assert_eq!(ctx.jurisdiction.as_deref(), Some("TX"));
}

#[test]
fn builder_nests_sections_clauses_and_subclauses() {
    let document = decompose(&[
        ("Heading 1", "PURCHASE AGREEMENT"),
        ("Normal", "1.1 Purchase Price. The Buyer shall pay {{TOTAL_PRICE}}."),
        ("Normal", "1.1.1 Deposit. Ten percent is due at signing."),
        ("Normal", "1.2 Closing. Closing occurs within thirty days."),
    ]);

    let section = by_code(&document, "s01");
    let clause = by_code(&document, "s01.c01");
    let subclause = by_code(&document, "s01.c01.s01");
    let sibling = by_code(&document, "s01.c02");

    assert_eq!(section.block_type, BlockType::Section);
    assert_eq!(clause.parent_temp_id, Some(section.temp_id));
    assert_eq!(subclause.parent_temp_id, Some(clause.temp_id));
    assert_eq!(sibling.parent_temp_id, Some(section.temp_id));
    assert_eq!(subclause.hierarchy_level, 4);
    assert_eq!(clause.variables_used, vec!["TOTAL_PRICE".to_string()]);
}

#[test]
fn parent_links_never_cycle() {
    let document = decompose(&[
        ("Heading 1", "AGREEMENT"),
        ("Normal", "1.1 First clause text follows here."),
        ("Normal", "1.1.1 Nested detail text."),
        ("Normal", "supporting orphan paragraph."),
        ("Heading 1", "SECOND ARTICLE"),
        ("Normal", "2.1 Another clause entirely."),
    ]);

    let parents: HashMap<u32, Option<u32>> = document
        .clauses
        .iter()
        .map(|clause| (clause.temp_id, clause.parent_temp_id))
        .collect();

    for clause in &document.clauses {
        let mut cursor = Some(clause.temp_id);
        let mut hops = 0;
        while let Some(temp_id) = cursor {
            hops += 1;
            assert!(hops <= 10, "parent chain for {} did not terminate", clause.code);
            cursor = parents
                .get(&temp_id)
                .copied()
                .unwrap_or_else(|| panic!("dangling parent reference from {}", clause.code));
        }
    }
}

#[test]
fn body_paragraphs_append_with_blank_line_separator() {
    let document = decompose(&[
        ("Heading 1", "RECITALS"),
        ("Normal", "The Seller designs and builds homes."),
        ("Normal", "The Buyer wishes to purchase one."),
    ]);

    let section = by_code(&document, "s01");
    assert!(section.content.contains("The Seller designs"));
    assert!(section
        .content
        .contains("homes.\n\nThe Buyer wishes"));
}

#[test]
fn paragraph_after_leaf_becomes_orphan_node_under_clause() {
    let document = decompose(&[
        ("Heading 1", "SCOPE OF WORK"),
        ("Normal", "1.1 Deliverables are listed below."),
        ("Normal", "i. finished unit shell"),
        ("Normal", "Additional materials may be substituted."),
    ]);

    let clause = by_code(&document, "s01.c01");
    let list_item = by_code(&document, "s01.c01.li01");
    let orphan = by_code(&document, "s01.c01.p01");

    assert_eq!(list_item.block_type, BlockType::ListItem);
    assert_eq!(list_item.parent_temp_id, Some(clause.temp_id));
    assert_eq!(orphan.block_type, BlockType::Paragraph);
    assert_eq!(orphan.parent_temp_id, Some(clause.temp_id));
}

#[test]
fn sort_order_is_strictly_increasing() {
    let document = decompose(&[
        ("Heading 1", "FIRST"),
        ("Normal", "1.1 Clause one body."),
        ("Normal", "i. list entry"),
        ("Heading 1", "SECOND"),
        ("Normal", "2.1 Clause two body."),
    ]);

    let mut previous = 0;
    let mut ordered = document.clauses.clone();
    ordered.sort_by_key(|clause| clause.temp_id);
    for clause in &ordered {
        assert!(clause.sort_order > previous);
        previous = clause.sort_order;
    }
}

#[test]
fn reingestion_is_deterministic() {
    let source = [
        ("Heading 1", "PURCHASE AGREEMENT"),
        ("Normal", "California Provisions"),
        ("Normal", "1.1 Escrow. Funds are held by {{ESCROW_AGENT}}."),
        ("Normal", "EXHIBIT B — Warranty"),
        ("Normal", "Coverage lasts ten years."),
    ];

    let first = decompose(&source);
    let second = decompose(&source);

    assert_eq!(first.clauses.len(), second.clauses.len());
    for (left, right) in first.clauses.iter().zip(second.clauses.iter()) {
        assert_eq!(left.code, right.code);
        assert_eq!(left.content, right.content);
        assert_eq!(left.sort_order, right.sort_order);
        assert_eq!(left.conditions, right.conditions);
    }
    assert_eq!(first.exhibits.len(), second.exhibits.len());
}

#[test]
fn jurisdiction_is_inherited_until_exhibit_boundary() {
    let document = decompose(&[
        ("Heading 1", "STATE ADDENDA"),
        ("Normal", "California Provisions"),
        ("Normal", "1.1 Lien releases follow California law."),
        ("Normal", "EXHIBIT B — Warranty"),
        ("Normal", "Warranty Coverage:"),
    ]);

    let ca_clause = by_code(&document, "s01.c01");
    assert_eq!(
        ca_clause.conditions.get(CONDITION_JURISDICTION).map(String::as_str),
        Some("CA")
    );

    // The clause created inside exhibit B no longer carries the ambient
    // jurisdiction.
    let after = document
        .clauses
        .iter()
        .find(|clause| clause.heading.as_deref() == Some("Warranty Coverage"))
        .expect("clause inside exhibit");
    assert!(after.conditions.get(CONDITION_JURISDICTION).is_none());
}

#[test]
fn service_model_resets_at_level_one_boundary() {
    let document = decompose(&[
        ("Heading 1", "CRC SERVICE TERMS"),
        ("Normal", "1.1 Site work remains the Buyer's responsibility."),
        ("Heading 1", "GENERAL PROVISIONS"),
        ("Normal", "2.1 Notices must be in writing."),
    ]);

    let crc_clause = by_code(&document, "s01.c01");
    assert_eq!(crc_clause.service_model_condition, Some(ServiceModel::Crc));

    let general_clause = by_code(&document, "s02.c01");
    assert!(general_clause.service_model_condition.is_none());
}

#[test]
fn disclosure_marker_forces_dynamic_block_and_is_consumed() {
    let document = decompose(&[
        ("Heading 1", "DISCLOSURES"),
        ("Normal", "1.1 Statutory Notice follows in this section."),
        ("Normal", "[STATE_DISCLOSURE:CA_LIEN] applies to this clause."),
    ]);

    let clause = by_code(&document, "s01.c01");
    assert_eq!(clause.block_type, BlockType::DynamicDisclosure);
    assert_eq!(clause.disclosure_code.as_deref(), Some("CA_LIEN"));
    assert!(!clause.content.contains("STATE_DISCLOSURE"));
}

#[test]
fn same_letter_exhibit_header_does_not_split() {
    let document = decompose(&[
        ("Normal", "EXHIBIT B — Warranty"),
        ("Normal", "Coverage details follow."),
        ("Normal", "EXHIBIT B Continued"),
        ("Normal", "More coverage details."),
        ("Normal", "EXHIBIT C — Site Plan"),
    ]);

    assert_eq!(document.exhibits.len(), 2);
    assert_eq!(document.exhibits[0].letter, 'B');
    assert!(document.exhibits[0].content.contains("More coverage details."));
    assert_eq!(document.exhibits[1].letter, 'C');
}

#[test]
fn lowercase_exhibit_header_still_splits_with_warning() {
    let document = decompose(&[
        ("Normal", "Exhibit b — warranty terms"),
        ("Normal", "Coverage details."),
    ]);

    assert_eq!(document.exhibits.len(), 1);
    assert_eq!(document.exhibits[0].letter, 'B');
    assert_eq!(document.warnings.len(), 1);
    assert!(document.warnings[0].contains("strict validation"));
}

#[test]
fn exhibit_content_trims_dangling_list_markers() {
    let document = decompose(&[
        ("Normal", "EXHIBIT D — Punch List"),
        ("Normal", "Items to complete before closing."),
        ("Normal", "i."),
        ("Normal", "EXHIBIT E — Reserved"),
    ]);

    let punch_list = &document.exhibits[0];
    assert!(punch_list.content.ends_with("before closing."));
}

#[test]
fn derived_template_splits_base_and_conditional_rules() {
    let document = decompose(&[
        ("Heading 1", "GENERAL TERMS"),
        ("Normal", "1.1 Payment is due at closing."),
        ("Heading 1", "CRC ADDENDUM"),
        ("Normal", "2.1 The Buyer retains the site contractor."),
        ("Heading 1", "STATE ADDENDA"),
        ("Normal", "California Provisions"),
        ("Normal", "3.1 Lien waivers follow state law."),
    ]);

    let template = derive_template("purchase_agreement", &document.clauses);

    assert!(template.base_clause_codes.contains(&"s01".to_string()));
    assert!(template.base_clause_codes.contains(&"s01.c01".to_string()));
    assert!(!template.base_clause_codes.contains(&"s02.c01".to_string()));

    let crc_rule = template
        .conditional_rules
        .get("serviceModel")
        .and_then(|by_value| by_value.get("CRC"))
        .expect("CRC rule present");
    assert!(crc_rule.contains(&"s02.c01".to_string()));

    let ca_rule = template
        .conditional_rules
        .get("jurisdiction")
        .and_then(|by_value| by_value.get("CA"))
        .expect("CA rule present");
    assert!(ca_rule.contains(&"s03.c01".to_string()));
}
