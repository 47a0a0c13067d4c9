//! Catalogue of every bilingual message the pipeline emits.

use super::Bilingual;
use std::fmt::Display;
use std::path::Path;

pub fn ingest_started(origin: &str, kind: &str, location: &str) -> Bilingual {
    Bilingual::new(
        format!("Iniciando ingestão de '{origin}' a partir de {kind} ({location})"),
        format!("Starting ingestion of '{origin}' from {kind} ({location})"),
    )
}

pub fn ingest_completed(origin: &str, rows: usize, path: &Path) -> Bilingual {
    Bilingual::new(
        format!(
            "Ingestão de '{origin}' concluída: {rows} linhas em {}",
            path.display()
        ),
        format!(
            "Ingestion of '{origin}' completed: {rows} rows in {}",
            path.display()
        ),
    )
}

pub fn ingest_failed(origin: &str, err: &dyn Display) -> Bilingual {
    Bilingual::new(
        format!("Erro na ingestão de '{origin}': {err}"),
        format!("Error during ingestion of '{origin}': {err}"),
    )
}

pub fn directories_ready(root: &Path) -> Bilingual {
    Bilingual::new(
        format!("Diretórios prontos em {}", root.display()),
        format!("Directories ready under {}", root.display()),
    )
}

pub fn source_loaded(rows: usize, columns: usize) -> Bilingual {
    Bilingual::new(
        format!("Dados carregados com {rows} linhas e {columns} colunas"),
        format!("Data loaded with {rows} rows and {columns} columns"),
    )
}

pub fn row_limit_applied(limit: usize) -> Bilingual {
    Bilingual::new(
        format!("Limite de {limit} linhas aplicado"),
        format!("Row limit of {limit} applied"),
    )
}

pub fn retrying(attempt: u32, max: u32, backoff_ms: u64, err: &dyn Display) -> Bilingual {
    Bilingual::new(
        format!("Tentativa {attempt}/{max} falhou, nova tentativa em {backoff_ms} ms: {err}"),
        format!("Attempt {attempt}/{max} failed, retrying in {backoff_ms} ms: {err}"),
    )
}

pub fn empty_table() -> Bilingual {
    Bilingual::new("DataFrame vazio", "Empty DataFrame")
}

pub fn quality_rejected(reason: &str) -> Bilingual {
    Bilingual::new(
        format!("Dados rejeitados pela verificação de qualidade: {reason}"),
        format!("Data rejected by quality check: {reason}"),
    )
}

pub fn contract_failed(contract: &str, violations: usize) -> Bilingual {
    Bilingual::new(
        format!("Erro na validação dos dados pelo contrato '{contract}': {violations} violações"),
        format!("Error validating data against contract '{contract}': {violations} violations"),
    )
}

pub fn data_saved(path: &Path) -> Bilingual {
    Bilingual::new(
        format!("Dados salvos: {}", path.display()),
        format!("Data saved: {}", path.display()),
    )
}

pub fn metadata_saved(path: &Path) -> Bilingual {
    Bilingual::new(
        format!("Metadados salvos: {}", path.display()),
        format!("Metadata saved: {}", path.display()),
    )
}

pub fn save_failed(err: &dyn Display) -> Bilingual {
    Bilingual::new(
        format!("Erro ao salvar dados/metadados: {err}"),
        format!("Error saving data/metadata: {err}"),
    )
}

pub fn cleaning_started(path: &Path) -> Bilingual {
    Bilingual::new(
        format!("Iniciando limpeza de {}", path.display()),
        format!("Starting cleaning of {}", path.display()),
    )
}

pub fn cleaning_pass(pass: &str, rows: usize, columns: usize) -> Bilingual {
    Bilingual::new(
        format!("Etapa '{pass}' concluída: {rows} linhas, {columns} colunas"),
        format!("Pass '{pass}' finished: {rows} rows, {columns} columns"),
    )
}

pub fn cleaning_completed(path: &Path, rows: usize) -> Bilingual {
    Bilingual::new(
        format!("Limpeza concluída: {rows} linhas em {}", path.display()),
        format!("Cleaning completed: {rows} rows in {}", path.display()),
    )
}

pub fn cleaning_failed(err: &dyn Display) -> Bilingual {
    Bilingual::new(
        format!("Erro ao processar dados: {err}"),
        format!("Error processing data: {err}"),
    )
}

pub fn notification_failed(err: &dyn Display) -> Bilingual {
    Bilingual::new(
        format!("Falha ao enviar notificação: {err}"),
        format!("Failed to send notification: {err}"),
    )
}

pub fn no_table_found(url: &str) -> Bilingual {
    Bilingual::new(
        format!("Nenhuma tabela encontrada na página {url}"),
        format!("No table found on the page {url}"),
    )
}

pub fn downloading(kind: &str, location: &str) -> Bilingual {
    Bilingual::new(
        format!("Baixando arquivo de {kind}: {location}"),
        format!("Downloading file from {kind}: {location}"),
    )
}
