//! Pastoral metadata enrichment for ingested documents.
//!
//! Every chunk pushed to the vector index carries metadata derived from
//! its section title and body: pastoral category, target audience,
//! weekday and schedule when the document states them, principal
//! keywords, and a short description. Retrieval filters on
//! `categoria_pastoral`, and the enriched keywords noticeably improve
//! recall for one-word queries ("eloos", "cáritas").
//!
//! Detection is deliberately rule-based and deterministic — the source
//! documents are maintained by the parish office and follow a stable
//! `**Día:** / **Horario:** / ### Descripción` layout.

use serde_json::json;

/// Valid values for the `categoria_pastoral` metadata field and the
/// retrieval filter.
pub const PASTORAL_CATEGORIES: &[&str] = &[
    "sacramentos",
    "catequesis",
    "liturgia",
    "caritas",
    "grupos_oracion",
    "jovenes",
    "familias",
    "formacion",
    "comunidad_china",
    "informacion_general",
];

/// Metadata attached to one indexed chunk.
#[derive(Debug, Clone)]
pub struct ChunkMetadata {
    pub titulo: String,
    pub categoria_pastoral: String,
    pub audiencia_objetivo: String,
    pub dia_semana: Option<String>,
    pub horario: Option<String>,
    pub keywords_principales: Vec<String>,
    pub keywords_sinonimos: Vec<String>,
    pub descripcion_corta: String,
}

impl ChunkMetadata {
    /// Derive metadata for a chunk from its section title and text.
    pub fn derive(title: &str, content: &str) -> Self {
        let (principales, sinonimos) = smart_keywords(title);
        Self {
            titulo: title.to_string(),
            categoria_pastoral: detect_categoria(title, content).to_string(),
            audiencia_objetivo: detect_audiencia(title, content).to_string(),
            dia_semana: extract_dia(content),
            horario: extract_horario(content),
            keywords_principales: principales,
            keywords_sinonimos: sinonimos,
            descripcion_corta: short_description(content),
        }
    }

    /// Render as the JSON object stored alongside the vector. The chunk
    /// text goes in `pageContent`, matching what the chat tool reads back.
    pub fn to_index_json(&self, page_content: &str, file_name: &str) -> serde_json::Value {
        let mut obj = json!({
            "titulo": self.titulo,
            "categoria_pastoral": self.categoria_pastoral,
            "tipo_contenido": "actividad_pastoral",
            "audiencia_objetivo": self.audiencia_objetivo,
            "keywords_principales": self.keywords_principales,
            "keywords_sinonimos": self.keywords_sinonimos,
            "descripcion_corta": self.descripcion_corta,
            "pageContent": page_content,
            "file_name": file_name,
        });
        if let Some(ref dia) = self.dia_semana {
            obj["dia_semana"] = json!(dia);
        }
        if let Some(ref horario) = self.horario {
            obj["horario"] = json!(horario);
        }
        obj
    }
}

fn contains_any(text: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| text.contains(n))
}

/// Pastoral category from title + content keywords. First rule wins.
pub fn detect_categoria(title: &str, content: &str) -> &'static str {
    let text = format!("{} {}", title, content).to_lowercase();

    if contains_any(
        &text,
        &["bautismo", "confirmación", "matrimonio", "sacramento"],
    ) {
        return "sacramentos";
    }
    if contains_any(&text, &["catequesis", "primera comunión", "edge", "lifeteen"]) {
        return "catequesis";
    }
    if contains_any(&text, &["misa", "liturgia", "eucaristía"]) {
        return "liturgia";
    }
    if contains_any(&text, &["cáritas", "necesitados", "vulnerabilidad"]) {
        return "caritas";
    }
    if contains_any(&text, &["rosario", "oración", "adoración", "madres"]) {
        return "grupos_oracion";
    }
    if contains_any(&text, &["jóvenes", "eloos", "bartimeo", "pozo", "mies"]) {
        return "jovenes";
    }
    if contains_any(&text, &["familia", "pareja", "oro y café"]) {
        return "familias";
    }
    if contains_any(&text, &["biblia", "teología", "formación", "catecumenado"]) {
        return "formacion";
    }

    "informacion_general"
}

/// Target audience from title + content keywords.
pub fn detect_audiencia(title: &str, content: &str) -> &'static str {
    let text = format!("{} {}", title, content).to_lowercase();

    if contains_any(&text, &["niños", "infantil"]) {
        return "ninos_catequesis";
    }
    if contains_any(&text, &["adolescentes", "jóvenes", "17 años en adelante"]) {
        return "jovenes";
    }
    if contains_any(&text, &["adultos", "mayores de 40"]) {
        return "adultos";
    }
    if contains_any(&text, &["familia", "pareja", "matrimonio"]) {
        return "familias";
    }
    if contains_any(&text, &["tercera edad"]) {
        return "tercera_edad";
    }

    "publico_general"
}

const WEEKDAYS: &[&str] = &[
    "lunes",
    "martes",
    "miércoles",
    "jueves",
    "viernes",
    "sábado",
    "domingo",
];

/// Weekday from a `**Día:** …` field, normalized to a lowercase name.
pub fn extract_dia(content: &str) -> Option<String> {
    let value = field_value(content, "**Día:**")?;
    let lower = value.to_lowercase();
    WEEKDAYS
        .iter()
        .find(|d| lower.contains(*d))
        .map(|d| d.to_string())
}

/// Schedule from a `**Horario:** …` field, falling back to the first
/// `HH:MM` time found anywhere in the content.
pub fn extract_horario(content: &str) -> Option<String> {
    if let Some(value) = field_value(content, "**Horario:**") {
        return Some(value);
    }
    find_time(content)
}

/// Value of a bold `**Field:**` line, trimmed.
fn field_value(content: &str, field: &str) -> Option<String> {
    for line in content.lines() {
        if let Some(pos) = line.find(field) {
            let value = line[pos + field.len()..].trim();
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

/// First `H:MM` / `HH:MM` occurrence, including a trailing `h` if present.
fn find_time(text: &str) -> Option<String> {
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].is_ascii_digit() {
            let start = i;
            let mut j = i + 1;
            if j < bytes.len() && bytes[j].is_ascii_digit() {
                j += 1;
            }
            if j + 2 < bytes.len()
                && bytes[j] == b':'
                && bytes[j + 1].is_ascii_digit()
                && bytes[j + 2].is_ascii_digit()
            {
                let mut end = j + 3;
                if end < bytes.len() && bytes[end] == b'h' {
                    end += 1;
                }
                return Some(text[start..end].to_string());
            }
            i = j;
        } else {
            i += 1;
        }
    }
    None
}

const TITLE_STOPWORDS: &[&str] = &["grupo", "para", "los", "las", "del", "con"];

const MAX_KEYWORDS: usize = 8;

/// Principal keywords from the title plus synonym expansion for known
/// parish groups. Sacramental terms are never replaced by synonyms —
/// "testigos" and "padrinos" are different things.
pub fn smart_keywords(title: &str) -> (Vec<String>, Vec<String>) {
    let lower = title.to_lowercase();

    let mut principales: Vec<String> = Vec::new();
    for word in lower.split(|c: char| !c.is_alphanumeric()) {
        if word.len() > 2
            && !TITLE_STOPWORDS.contains(&word)
            && !principales.iter().any(|w| w == word)
        {
            principales.push(word.to_string());
        }
    }

    let mut sinonimos: Vec<String> = Vec::new();
    let mut push_all = |dst: &mut Vec<String>, words: &[&str]| {
        for w in words {
            if !dst.iter().any(|x| x == w) {
                dst.push(w.to_string());
            }
        }
    };

    if lower.contains("eloos entrega") {
        push_all(&mut principales, &["eloos", "servicio calle"]);
        push_all(
            &mut sinonimos,
            &["voluntariado jóvenes", "ayuda personas calle", "servicio social"],
        );
    } else if lower.contains("eloos") {
        push_all(&mut principales, &["eloos", "deporte"]);
        push_all(
            &mut sinonimos,
            &["fútbol", "voleibol", "montaña", "actividad deportiva"],
        );
    }
    if lower.contains("cáritas") {
        push_all(&mut principales, &["ayuda social"]);
        push_all(
            &mut sinonimos,
            &["ayuda necesitados", "caridad", "familias necesitadas"],
        );
    }
    if lower.contains("catequesis") {
        push_all(&mut principales, &["primera comunión"]);
        push_all(
            &mut sinonimos,
            &["iniciación cristiana", "formación niños", "preparación sacramentos"],
        );
    }
    if lower.contains("edge") {
        push_all(&mut principales, &["lifeteen", "preadolescentes"]);
        push_all(&mut sinonimos, &["catequesis 10-13 años"]);
    }
    if lower.contains("lifeteen") {
        push_all(&mut principales, &["adolescentes"]);
        push_all(&mut sinonimos, &["catequesis 14-18 años"]);
    }
    if lower.contains("oro y café") {
        push_all(&mut principales, &["parejas", "matrimonios"]);
        push_all(
            &mut sinonimos,
            &["encuentro matrimonios", "espiritualidad pareja"],
        );
    }
    if lower.contains("bartimeo") {
        push_all(&mut principales, &["retiro adolescentes"]);
        push_all(&mut sinonimos, &["encuentro adolescentes", "retiro fin de semana"]);
    }
    if lower.contains("pozo") {
        push_all(&mut principales, &["grupo juvenil"]);
        push_all(&mut sinonimos, &["animación litúrgica", "servicio jóvenes"]);
    }
    if lower.contains("biblia") || lower.contains("teología") {
        push_all(&mut principales, &["formación"]);
        push_all(&mut sinonimos, &["estudio bíblico", "formación fe"]);
    }

    principales.truncate(MAX_KEYWORDS);
    sinonimos.truncate(MAX_KEYWORDS);
    (principales, sinonimos)
}

/// First 50 words of the `### Descripción` block, bold markers removed.
pub fn short_description(content: &str) -> String {
    let Some(pos) = content.find("### Descripción") else {
        return String::new();
    };
    let after = &content[pos + "### Descripción".len()..];
    // Block ends at the next heading or horizontal rule.
    let end = after
        .find("\n---")
        .or_else(|| after.find("\n##"))
        .unwrap_or(after.len());
    let block = after[..end].replace("**", "");

    let words: Vec<&str> = block.split_whitespace().collect();
    if words.len() > 50 {
        format!("{}...", words[..50].join(" "))
    } else {
        words.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categoria_sacramentos_wins_over_later_rules() {
        assert_eq!(
            detect_categoria("Preparación al Bautismo", "para familias"),
            "sacramentos"
        );
    }

    #[test]
    fn categoria_jovenes_for_eloos() {
        assert_eq!(detect_categoria("Eloos Superación", "deporte"), "jovenes");
    }

    #[test]
    fn categoria_fallback_general() {
        assert_eq!(
            detect_categoria("Secretaría", "horario de atención"),
            "informacion_general"
        );
    }

    #[test]
    fn audiencia_detection() {
        assert_eq!(detect_audiencia("Catequesis", "para niños"), "ninos_catequesis");
        assert_eq!(detect_audiencia("Lifeteen", "adolescentes"), "jovenes");
        assert_eq!(detect_audiencia("Dalmanuta", "mayores de 40"), "adultos");
        assert_eq!(detect_audiencia("Secretaría", "todos"), "publico_general");
    }

    #[test]
    fn dia_extracted_from_bold_field() {
        let content = "**Lugar:** Salón\n**Día:** Todos los Miércoles\n**Horario:** 19:30";
        assert_eq!(extract_dia(content).as_deref(), Some("miércoles"));
    }

    #[test]
    fn dia_missing_field_is_none() {
        assert_eq!(extract_dia("Sin campos estructurados"), None);
    }

    #[test]
    fn horario_prefers_bold_field() {
        let content = "**Horario:** 19:30 a 21:00\nLa misa es a las 10:00";
        assert_eq!(extract_horario(content).as_deref(), Some("19:30 a 21:00"));
    }

    #[test]
    fn horario_falls_back_to_time_pattern() {
        assert_eq!(
            extract_horario("Nos reunimos a las 19:30h en el salón").as_deref(),
            Some("19:30h")
        );
        assert_eq!(extract_horario("sin hora"), None);
    }

    #[test]
    fn keywords_skip_stopwords_and_dedup() {
        let (principales, _) = smart_keywords("Grupo para los Jóvenes Jóvenes");
        assert!(!principales.iter().any(|w| w == "grupo"));
        assert!(!principales.iter().any(|w| w == "para"));
        assert_eq!(
            principales.iter().filter(|w| w.as_str() == "jóvenes").count(),
            1
        );
    }

    #[test]
    fn eloos_entrega_gets_synonyms() {
        let (principales, sinonimos) = smart_keywords("Eloos Entrega");
        assert!(principales.iter().any(|w| w == "eloos"));
        assert!(sinonimos.iter().any(|w| w == "voluntariado jóvenes"));
    }

    #[test]
    fn keywords_capped_at_eight() {
        let (principales, sinonimos) =
            smart_keywords("Catequesis Eloos Entrega Bartimeo Pozo Biblia Lifeteen Edge Cáritas");
        assert!(principales.len() <= MAX_KEYWORDS);
        assert!(sinonimos.len() <= MAX_KEYWORDS);
    }

    #[test]
    fn short_description_takes_fifty_words() {
        let body = format!(
            "**Día:** Lunes\n\n### Descripción\n{}\n---\n",
            "palabra ".repeat(80)
        );
        let desc = short_description(&body);
        assert!(desc.ends_with("..."));
        assert_eq!(desc.split_whitespace().count(), 50);
    }

    #[test]
    fn short_description_empty_without_block() {
        assert_eq!(short_description("**Día:** Lunes"), "");
    }

    #[test]
    fn metadata_json_includes_optional_fields_when_present() {
        let meta = ChunkMetadata::derive(
            "Eloos Superación",
            "**Día:** Viernes\n**Horario:** 18:00\n\n### Descripción\nDeporte y fe.\n",
        );
        let json = meta.to_index_json("Deporte y fe.", "actividades.md");
        assert_eq!(json["categoria_pastoral"], "jovenes");
        assert_eq!(json["dia_semana"], "viernes");
        assert_eq!(json["horario"], "18:00");
        assert_eq!(json["pageContent"], "Deporte y fe.");
    }
}
